//! Layer compositing: which layers draw, in what order, at what alpha and depth.
//!
//! Pure CPU logic; the renderable turns the resulting passes into draw calls.

use core::cmp::Ordering;

use super::context::RenderContext;
use super::error::{TileError, TileResult};
use super::grid::TileGrid;

/// Stable draw-order key for one layer.
///
/// Ordering rules:
/// 1) `z`: ascending (back-to-front), total order over floats
/// 2) `index`: grid-declared order for equal z
#[derive(Debug, Copy, Clone)]
pub struct LayerKey {
    pub z: f32,
    pub index: usize,
}

impl PartialEq for LayerKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LayerKey {}

impl Ord for LayerKey {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        match self.z.total_cmp(&other.z) {
            Ordering::Equal => self.index.cmp(&other.index),
            o => o,
        }
    }
}

impl PartialOrd for LayerKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Layers considered by one render call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum LayerSelection {
    /// Every layer, ascending by z.
    #[default]
    All,
    /// Exactly one layer.
    Only(usize),
}

impl From<Option<usize>> for LayerSelection {
    fn from(layer: Option<usize>) -> Self {
        layer.map_or(Self::All, Self::Only)
    }
}

/// Per-call compositing inputs from the renderable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CompositeParams {
    pub alpha: f32,
    /// Resolved base z of the renderable.
    pub base_z: f32,
    pub z_override: Option<f32>,
    pub exporting: bool,
}

/// One layer to draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LayerPass {
    pub layer: usize,
    pub alpha: f32,
    pub z: f32,
}

/// Layer indices sorted back-to-front.
pub fn draw_order(grid: &TileGrid) -> Vec<usize> {
    let mut keys: Vec<LayerKey> = grid
        .layers()
        .iter()
        .enumerate()
        .map(|(index, l)| LayerKey { z: l.z, index })
        .collect();
    keys.sort();
    keys.into_iter().map(|k| k.index).collect()
}

/// Resolves the passes a render call issues, in draw order.
///
/// Layers that end at zero alpha are dropped rather than drawn invisibly.
pub fn plan_layers(
    grid: &TileGrid,
    ctx: &RenderContext,
    selection: LayerSelection,
    params: CompositeParams,
) -> TileResult<Vec<LayerPass>> {
    let order = match selection {
        LayerSelection::All => draw_order(grid),
        LayerSelection::Only(layer) if layer < grid.layer_count() => vec![layer],
        LayerSelection::Only(layer) => {
            return Err(TileError::LayerOutOfRange {
                layer,
                layers: grid.layer_count(),
            });
        }
    };

    let dims_inactive = !ctx.game_mode && ctx.is_editing(grid.id());
    let mut passes = Vec::with_capacity(order.len());

    for layer in order {
        let Some(info) = grid.layer(layer) else { continue };
        if !info.visible && !ctx.show_hidden_layers {
            continue;
        }

        let mut alpha = params.alpha;
        if dims_inactive && layer != grid.active_layer() {
            alpha *= ctx.inactive_layer_visibility.factor();
        }
        if alpha <= 0.0 {
            continue;
        }

        let z = if params.exporting {
            params.base_z
        } else if let Some(z) = params.z_override {
            z
        } else {
            params.base_z + info.z
        };

        passes.push(LayerPass { layer, alpha, z });
    }

    Ok(passes)
}
