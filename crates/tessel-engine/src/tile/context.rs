use glam::{Mat4, Vec2};

use crate::time::FrameTime;

use super::grid::GridId;

/// Editor-only alpha applied to non-active layers of the grid being edited.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum InactiveLayerVisibility {
    #[default]
    Visible,
    Dimmed,
    Hidden,
}

impl InactiveLayerVisibility {
    #[inline]
    pub fn factor(self) -> f32 {
        match self {
            Self::Visible => 1.0,
            Self::Dimmed => 0.25,
            Self::Hidden => 0.0,
        }
    }

    /// Cycles Visible -> Dimmed -> Hidden -> Visible.
    pub fn next(self) -> Self {
        match self {
            Self::Visible => Self::Dimmed,
            Self::Dimmed => Self::Hidden,
            Self::Hidden => Self::Visible,
        }
    }
}

/// World camera matrices.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub projection: Mat4,
    pub view: Mat4,
}

impl Camera {
    pub const IDENTITY: Self = Self {
        projection: Mat4::IDENTITY,
        view: Mat4::IDENTITY,
    };

    /// Orthographic camera looking at `center`, showing `half_height` world
    /// units above and below it.
    pub fn orthographic(center: Vec2, half_height: f32, aspect: f32) -> Self {
        let half_width = half_height * aspect.max(f32::EPSILON);
        Self {
            projection: Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                -100.0,
                100.0,
            ),
            view: Mat4::from_translation(-center.extend(0.0)),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Everything a renderable reads from its driver for one `update`/`render`.
///
/// Passed explicitly so the tile core has no global state.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    pub camera: Camera,
    /// Projection for screen-space (UI) renderables; their view is identity.
    pub ui_projection: Mat4,

    /// Milliseconds since the driver started.
    pub elapsed_ms: f64,
    /// Duration of the last application frame in milliseconds.
    pub frame_time_ms: f64,

    /// Grid currently open in the editor, if any.
    pub editing: Option<GridId>,
    pub game_mode: bool,
    /// Freezes animation entirely while in game mode.
    pub world_paused: bool,
    /// Draws layers the grid marks hidden.
    pub show_hidden_layers: bool,
    pub inactive_layer_visibility: InactiveLayerVisibility,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            camera: Camera::IDENTITY,
            ui_projection: Mat4::IDENTITY,
            elapsed_ms: 0.0,
            frame_time_ms: 0.0,
            editing: None,
            game_mode: false,
            world_paused: false,
            show_hidden_layers: false,
            inactive_layer_visibility: InactiveLayerVisibility::Visible,
        }
    }
}

impl RenderContext {
    #[inline]
    pub fn is_editing(&self, grid: GridId) -> bool {
        self.editing == Some(grid)
    }

    /// True when animation should neither advance nor accumulate time.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.game_mode && self.world_paused
    }

    /// Copies timing from a frame clock tick.
    pub fn advance(&mut self, time: &FrameTime) {
        self.elapsed_ms = time.elapsed_ms;
        self.frame_time_ms = time.dt_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_factors() {
        assert_eq!(InactiveLayerVisibility::Visible.factor(), 1.0);
        assert_eq!(InactiveLayerVisibility::Dimmed.factor(), 0.25);
        assert_eq!(InactiveLayerVisibility::Hidden.factor(), 0.0);
        assert_eq!(
            InactiveLayerVisibility::Hidden.next(),
            InactiveLayerVisibility::Visible
        );
    }

    #[test]
    fn frozen_only_in_paused_game_mode() {
        let mut ctx = RenderContext {
            world_paused: true,
            ..Default::default()
        };
        assert!(!ctx.is_frozen());
        ctx.game_mode = true;
        assert!(ctx.is_frozen());
    }

    #[test]
    fn orthographic_camera_maps_center_to_origin() {
        let cam = Camera::orthographic(Vec2::new(4.0, -2.0), 2.0, 1.0);
        let clip = cam.projection * cam.view * glam::Vec4::new(4.0, -2.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-6 && clip.y.abs() < 1e-6);
        let edge = cam.projection * cam.view * glam::Vec4::new(4.0, 0.0, 0.0, 1.0);
        assert!((edge.y - 1.0).abs() < 1e-6);
    }
}
