//! World placement of a renderable: position, scale, linear move-to, and
//! anchoring to an external game object.

use glam::{Mat4, Vec2, Vec3};

use super::context::RenderContext;

/// World units travelled per tick when no travel time is given.
pub const DEFAULT_MOVE_RATE: f32 = 1.0;

/// Floor for the tick duration used to derive a move rate, in milliseconds.
pub const MIN_MOVE_TICK_MS: f64 = 30.0;

/// Which space a renderable's placement resolves into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ViewMode {
    /// Camera projection and view.
    #[default]
    WorldSpace,
    /// UI projection, identity view.
    ScreenSpace,
    /// Identity projection and view; the grid exactly fills clip space.
    ExportFlattened,
}

/// Snapshot of an anchor object's transform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnchorState {
    pub position: Vec3,
    pub scale: Vec3,
    pub flip_x: bool,
    /// Anchor point inside the art as a fraction of width/height.
    pub offset_pct: Vec2,
}

impl Default for AnchorState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            flip_x: false,
            offset_pct: Vec2::ZERO,
        }
    }
}

/// An external object a renderable can follow.
///
/// Renderables hold anchors weakly and never destroy them.
pub trait Anchor {
    fn anchor_state(&self) -> AnchorState;
}

/// Final placement for one render call.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Resolved {
    pub loc: Vec3,
    pub scale: Vec3,
    pub projection: Mat4,
    pub view: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    position: Vec3,
    scale: Vec3,
    goal: Option<Vec3>,
    move_rate: f32,
    /// Unscaled art size in world units.
    extent: Vec2,
    width: f32,
    height: f32,
}

impl Placement {
    /// `extent` is the unscaled art size (`grid cells * quad size`).
    pub fn new(extent: Vec2) -> Self {
        let mut p = Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            goal: None,
            move_rate: DEFAULT_MOVE_RATE,
            extent,
            width: 0.0,
            height: 0.0,
        };
        p.recompute_size();
        p
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Scaled art width in world units.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn extent(&self) -> Vec2 {
        self.extent
    }

    #[inline]
    pub fn goal(&self) -> Option<Vec3> {
        self.goal
    }

    #[inline]
    pub fn move_rate(&self) -> f32 {
        self.move_rate
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.goal.is_some()
    }

    pub fn set_extent(&mut self, extent: Vec2) {
        self.extent = extent;
        self.recompute_size();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        if scale != self.scale {
            self.scale = scale;
            self.recompute_size();
        }
    }

    /// Starts a constant-speed move toward `goal`.
    ///
    /// With a positive `travel_secs`, the per-tick rate is chosen so the move
    /// spans `travel_secs` at the current tick length (floored at
    /// [`MIN_MOVE_TICK_MS`]). `None`, zero, negative or non-finite travel
    /// times use [`DEFAULT_MOVE_RATE`].
    pub fn move_to(&mut self, goal: Vec3, travel_secs: Option<f32>, tick_ms: f64) {
        let distance = self.position.distance(goal);
        if distance == 0.0 {
            self.snap_to(goal);
            return;
        }

        self.move_rate = match travel_secs {
            Some(secs) if secs > 0.0 && secs.is_finite() => {
                let ticks = (f64::from(secs) * 1000.0 / tick_ms.max(MIN_MOVE_TICK_MS)).max(1.0);
                (f64::from(distance) / ticks) as f32
            }
            _ => DEFAULT_MOVE_RATE,
        };
        self.goal = Some(goal);
    }

    /// Places immediately, cancelling any move in flight.
    pub fn snap_to(&mut self, position: Vec3) {
        self.position = position;
        self.goal = None;
    }

    /// Advances an in-flight move by one tick.
    pub fn step(&mut self) {
        let Some(goal) = self.goal else { return };
        let delta = goal - self.position;
        let distance = delta.length();
        if distance <= self.move_rate {
            self.snap_to(goal);
        } else {
            self.position += delta / distance * self.move_rate;
        }
    }

    /// Copies transform from an anchor, applying its art offset.
    pub fn follow(&mut self, anchor: &AnchorState) {
        let mut scale = anchor.scale;
        if anchor.flip_x {
            scale.x = -scale.x;
        }
        self.set_scale(scale);

        let mut position = anchor.position;
        let dx = self.width * anchor.offset_pct.x;
        if anchor.flip_x {
            position.x += dx;
        } else {
            position.x -= dx;
        }
        position.y += self.height * anchor.offset_pct.y;
        self.position = position;
    }

    /// Resolves location, scale and matrices for `mode`.
    pub fn resolve(&self, mode: ViewMode, ctx: &RenderContext) -> Resolved {
        match mode {
            ViewMode::WorldSpace => Resolved {
                loc: self.position,
                scale: self.scale,
                projection: ctx.camera.projection,
                view: ctx.camera.view,
            },
            ViewMode::ScreenSpace => Resolved {
                loc: self.position,
                scale: self.scale,
                projection: ctx.ui_projection,
                view: Mat4::IDENTITY,
            },
            ViewMode::ExportFlattened => Resolved {
                loc: Vec3::new(-1.0, 1.0, 0.0),
                scale: Vec3::new(
                    2.0 / self.extent.x.max(f32::EPSILON),
                    2.0 / self.extent.y.max(f32::EPSILON),
                    1.0,
                ),
                projection: Mat4::IDENTITY,
                view: Mat4::IDENTITY,
            },
        }
    }

    fn recompute_size(&mut self) {
        self.width = self.extent.x * self.scale.x.abs();
        self.height = self.extent.y * self.scale.y.abs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement() -> Placement {
        Placement::new(Vec2::new(8.0, 4.0))
    }

    // ── move_to ───────────────────────────────────────────────────────────

    #[test]
    fn default_rate_reaches_goal_in_ceil_distance_over_rate_ticks() {
        let mut p = placement();
        p.move_to(Vec3::new(10.0, 0.0, 0.0), None, 16.0);
        let ticks = (10.0 / DEFAULT_MOVE_RATE).ceil() as usize;

        let mut last_x = p.position().x;
        for _ in 0..ticks - 1 {
            p.step();
            assert!(p.position().x > last_x);
            assert!(p.is_moving());
            last_x = p.position().x;
        }
        p.step();
        assert_eq!(p.position(), Vec3::new(10.0, 0.0, 0.0));
        assert!(!p.is_moving());
    }

    #[test]
    fn travel_time_sets_rate_from_floored_tick() {
        let mut p = placement();
        // 1s at a 10ms tick is floored to 30ms ticks: 33.3 ticks.
        p.move_to(Vec3::new(100.0, 0.0, 0.0), Some(1.0), 10.0);
        assert!((p.move_rate() - 3.0).abs() < 1e-4);

        p.move_to(Vec3::new(100.0, 0.0, 0.0), Some(1.0), 50.0);
        assert!((p.move_rate() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn non_positive_travel_time_uses_default_rate() {
        for travel in [Some(0.0), Some(-2.0), Some(f32::NAN), None] {
            let mut p = placement();
            p.move_to(Vec3::new(5.0, 0.0, 0.0), travel, 16.0);
            assert_eq!(p.move_rate(), DEFAULT_MOVE_RATE, "{travel:?}");

            p.step();
            assert!(p.is_moving());
            for _ in 0..4 {
                p.step();
            }
            assert_eq!(p.position(), Vec3::new(5.0, 0.0, 0.0));
            assert!(!p.is_moving());
        }
    }

    #[test]
    fn move_to_current_position_is_not_moving() {
        let mut p = placement();
        p.move_to(Vec3::ZERO, Some(1.0), 16.0);
        assert!(!p.is_moving());
    }

    #[test]
    fn snap_cancels_move() {
        let mut p = placement();
        p.move_to(Vec3::new(5.0, 0.0, 0.0), None, 16.0);
        p.snap_to(Vec3::new(-1.0, 2.0, 3.0));
        assert!(!p.is_moving());
        p.step();
        assert_eq!(p.position(), Vec3::new(-1.0, 2.0, 3.0));
    }

    // ── anchoring ─────────────────────────────────────────────────────────

    #[test]
    fn follow_applies_offsets_and_scale() {
        let mut p = placement();
        p.follow(&AnchorState {
            position: Vec3::new(10.0, 10.0, 1.0),
            scale: Vec3::new(2.0, 2.0, 1.0),
            flip_x: false,
            offset_pct: Vec2::new(0.5, 1.0),
        });
        assert_eq!(p.width(), 16.0);
        assert_eq!(p.height(), 8.0);
        assert_eq!(p.position(), Vec3::new(2.0, 18.0, 1.0));
    }

    #[test]
    fn flipped_anchor_mirrors_scale_and_offset() {
        let mut p = placement();
        p.follow(&AnchorState {
            position: Vec3::new(10.0, 0.0, 0.0),
            scale: Vec3::ONE,
            flip_x: true,
            offset_pct: Vec2::new(0.5, 0.0),
        });
        assert_eq!(p.scale().x, -1.0);
        assert_eq!(p.width(), 8.0);
        assert_eq!(p.position().x, 14.0);
    }

    // ── resolve ───────────────────────────────────────────────────────────

    #[test]
    fn export_fills_clip_space() {
        let mut p = placement();
        p.snap_to(Vec3::new(50.0, 50.0, 5.0));
        p.set_scale(Vec3::splat(3.0));
        let r = p.resolve(ViewMode::ExportFlattened, &RenderContext::default());
        assert_eq!(r.loc, Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(r.scale, Vec3::new(0.25, 0.5, 1.0));
        // Bottom-right art corner lands on clip (1, -1).
        let corner = r.loc + Vec3::new(8.0, -4.0, 0.0) * r.scale;
        assert_eq!(corner.truncate(), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn screen_space_uses_ui_projection() {
        let ctx = RenderContext {
            ui_projection: Mat4::from_scale(Vec3::splat(0.5)),
            ..Default::default()
        };
        let r = placement().resolve(ViewMode::ScreenSpace, &ctx);
        assert_eq!(r.projection, ctx.ui_projection);
        assert_eq!(r.view, Mat4::IDENTITY);
    }
}
