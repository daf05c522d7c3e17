use thiserror::Error;

/// Errors raised by the tile rendering core.
///
/// Out-of-range frame indices are not errors (they wrap), and zero hold
/// durations are clamped locally; neither appears here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// The source grid has nothing to draw.
    #[error("source grid has no drawable content ({frames} frames, {layers} layers, {width}x{height} tiles)")]
    InvalidSource {
        frames: usize,
        layers: usize,
        width: u32,
        height: u32,
    },

    /// A renderable was used after `destroy()`.
    #[error("renderable used after destroy")]
    UseAfterDestroy,

    /// An explicit layer index does not exist on the bound grid.
    #[error("layer {layer} out of range (grid has {layers} layers)")]
    LayerOutOfRange { layer: usize, layers: usize },

    /// GPU buffer allocation or upload failed. Not retried.
    #[error("gpu buffer failure: {0}")]
    Gpu(String),
}

impl TileError {
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }
}

pub type TileResult<T> = Result<T, TileError>;
