use std::cell::Ref;
use std::rc::{Rc, Weak};

use glam::{Vec2, Vec3};

use crate::render::tiles::{LayerDraw, TileGpu};
use crate::time::AnimationClock;

use super::buffers::{BufferSet, validate_source};
use super::compositor::{CompositeParams, LayerSelection, plan_layers};
use super::context::{InactiveLayerVisibility, RenderContext};
use super::error::{TileError, TileResult};
use super::geometry::TileAttrs;
use super::grid::{SharedGrid, TileGrid};
use super::placement::{Anchor, Placement, Resolved, ViewMode};
use super::subscribers::{Invalidation, SubscriberId};

/// A GPU-backed view onto one shared grid.
///
/// Each renderable owns its buffer set, transform and displayed frame, so many
/// renderables may show the same grid at different frames. The grid holds the
/// renderable only weakly (through its invalidation cell).
///
/// Drive it once per application frame with [`update`](Self::update) followed
/// by [`render`](Self::render).
pub struct TileRenderable {
    id: SubscriberId,
    grid: SharedGrid,
    invalidation: Rc<Invalidation>,
    buffers: BufferSet,

    placement: Placement,
    clock: AnimationClock,
    frame: usize,

    alpha: f32,
    bg_alpha: f32,
    visible: bool,
    exporting: bool,
    view_mode: ViewMode,

    anchor: Option<Weak<dyn Anchor>>,
    destroyed: bool,
}

impl std::fmt::Debug for TileRenderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRenderable")
            .field("id", &self.id)
            .field("frame", &self.frame)
            .field("placement", &self.placement)
            .field("visible", &self.visible)
            .field("exporting", &self.exporting)
            .field("view_mode", &self.view_mode)
            .field("anchored", &self.anchor.is_some())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl TileRenderable {
    /// Creates a renderable showing the grid's active frame.
    pub fn create<G: TileGpu + ?Sized>(
        gpu: &mut G,
        grid: SharedGrid,
        anchor: Option<Weak<dyn Anchor>>,
    ) -> TileResult<Self> {
        let id = SubscriberId::next();
        let invalidation = Rc::new(Invalidation::default());

        let (buffers, frame, extent) = {
            let g = grid.borrow();
            validate_source(&g)?;
            let frame = g.active_frame() % g.frame_count();
            (BufferSet::create(gpu, &g, frame)?, frame, art_extent(&g))
        };
        grid.borrow_mut().register(id, &invalidation);

        let mut renderable = Self {
            id,
            grid,
            invalidation,
            buffers,
            placement: Placement::new(extent),
            clock: AnimationClock::new(),
            frame,
            alpha: 1.0,
            bg_alpha: 1.0,
            visible: true,
            exporting: false,
            view_mode: ViewMode::WorldSpace,
            anchor,
            destroyed: false,
        };
        renderable.follow_anchor();
        Ok(renderable)
    }

    /// Sets the space this renderable resolves into (world or screen).
    pub fn with_view_mode(mut self, mode: ViewMode) -> Self {
        self.view_mode = mode;
        self
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn grid(&self) -> Ref<'_, TileGrid> {
        self.grid.borrow()
    }

    pub fn shared_grid(&self) -> &SharedGrid {
        &self.grid
    }

    /// Frame currently displayed; always `< frame_count`.
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn is_animating(&self) -> bool {
        self.clock.is_playing()
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[inline]
    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.placement.is_moving()
    }

    #[inline]
    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    #[inline]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.placement.position()
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.placement.width()
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.placement.height()
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.placement.set_scale(scale);
    }

    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn bg_alpha(&self) -> f32 {
        self.bg_alpha
    }

    pub fn set_bg_alpha(&mut self, alpha: f32) {
        self.bg_alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_anchor(&mut self, anchor: Option<Weak<dyn Anchor>>) {
        self.anchor = anchor;
        self.follow_anchor();
    }

    /// Location as the current mode resolves it (export corner while exporting).
    pub fn loc(&self, ctx: &RenderContext) -> Vec3 {
        self.resolve(ctx).loc
    }

    /// Scale as the current mode resolves it (clip-filling while exporting).
    pub fn resolved_scale(&self, ctx: &RenderContext) -> Vec3 {
        self.resolve(ctx).scale
    }

    // ── per-tick ──────────────────────────────────────────────────────────

    /// Advances animation and placement by `dt_ms`, applying pending grid edits.
    pub fn update<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        ctx: &RenderContext,
        dt_ms: f64,
    ) -> TileResult<()> {
        self.ensure_live()?;
        self.sync_buffers(gpu)?;

        if self.clock.is_playing() && !ctx.is_frozen() {
            let next = {
                let g = self.grid.borrow();
                self.clock.tick(dt_ms, self.frame, g.holds())
            };
            if next != self.frame {
                self.show_frame(gpu, next)?;
            }
        }

        if !self.follow_anchor() {
            self.placement.step();
        }
        Ok(())
    }

    /// Draws visible layers and returns the number of draw calls issued.
    ///
    /// `layers = None` draws every layer back-to-front by z; `Some(i)` draws
    /// exactly layer `i`. An invisible renderable issues no GPU calls.
    pub fn render<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        ctx: &RenderContext,
        layers: Option<usize>,
        z_override: Option<f32>,
        brightness: f32,
    ) -> TileResult<usize> {
        self.ensure_live()?;
        if !self.visible && !self.exporting {
            return Ok(0);
        }
        self.sync_buffers(gpu)?;

        let resolved = self.resolve(ctx);
        let passes = {
            let g = self.grid.borrow();
            plan_layers(
                &g,
                ctx,
                LayerSelection::from(layers),
                CompositeParams {
                    alpha: self.alpha,
                    base_z: resolved.loc.z,
                    z_override,
                    exporting: self.exporting,
                },
            )?
        };
        if passes.is_empty() {
            return Ok(0);
        }
        let id = self.buffers.id().ok_or(TileError::UseAfterDestroy)?;

        gpu.bind_program();
        gpu.set_blending(true);
        let mut drawn = 0;
        let mut result = Ok(());
        for pass in &passes {
            let draw = LayerDraw {
                layer: pass.layer,
                elements: self.buffers.layer_elements(pass.layer),
                projection: resolved.projection,
                view: resolved.view,
                position: resolved.loc.truncate().extend(pass.z),
                scale: resolved.scale,
                alpha: pass.alpha,
                bg_alpha: self.bg_alpha,
                brightness,
            };
            if let Err(e) = gpu.draw_layer(id, &draw) {
                result = Err(e);
                break;
            }
            drawn += 1;
        }
        gpu.set_blending(false);
        result.map(|()| drawn)
    }

    /// Renders `frame` for offscreen capture, then restores interactive state.
    ///
    /// For the duration of the call the renderable is flagged exporting (identity
    /// camera, clip-filling placement, flattened z, drawn even if hidden), every
    /// layer shows at full strength, and preview edits on the grid are undone.
    /// `capture` runs after the draws are issued and before anything is
    /// restored; it is where the driver submits and reads back the target.
    ///
    /// Displayed frame, exporting flag, preview edits and the context are the
    /// same after the call as before it.
    pub fn render_frame_for_export<G, T, E, F>(
        &mut self,
        gpu: &mut G,
        ctx: &RenderContext,
        frame: usize,
        capture: F,
    ) -> Result<T, E>
    where
        G: TileGpu + ?Sized,
        E: From<TileError>,
        F: FnOnce(&mut G) -> Result<T, E>,
    {
        self.ensure_live()?;
        let prior_frame = self.frame;
        let export_ctx = RenderContext {
            inactive_layer_visibility: InactiveLayerVisibility::Visible,
            ..ctx.clone()
        };

        let previews = {
            let mut g = self.grid.borrow_mut();
            let undone = g.undo_preview_edits();
            g.commit_pending();
            undone
        };

        self.exporting = true;
        let captured = self
            .set_frame(gpu, frame as i64)
            .and_then(|()| self.render(gpu, &export_ctx, None, None, 1.0))
            .map_err(E::from)
            .and_then(|_| capture(gpu));
        self.exporting = false;

        {
            let mut g = self.grid.borrow_mut();
            g.reapply_preview_edits(previews);
            g.commit_pending();
        }
        let restored = self.set_frame(gpu, prior_frame as i64);

        let value = captured?;
        restored?;
        Ok(value)
    }

    // ── frame control ─────────────────────────────────────────────────────

    /// Shows frame `index mod frame_count`; negative indices wrap from the end.
    pub fn set_frame<G: TileGpu + ?Sized>(&mut self, gpu: &mut G, index: i64) -> TileResult<()> {
        self.ensure_live()?;
        let count = self.grid.borrow().frame_count() as i64;
        self.show_frame(gpu, index.rem_euclid(count.max(1)) as usize)
    }

    pub fn advance_frame<G: TileGpu + ?Sized>(&mut self, gpu: &mut G) -> TileResult<()> {
        self.set_frame(gpu, self.frame as i64 + 1)
    }

    pub fn rewind_frame<G: TileGpu + ?Sized>(&mut self, gpu: &mut G) -> TileResult<()> {
        self.set_frame(gpu, self.frame as i64 - 1)
    }

    pub fn start_animating(&mut self) {
        self.clock.start();
    }

    /// Stops playback. Outside game mode the display snaps back to the grid's
    /// active (edited) frame; in game mode it stays where playback stopped.
    pub fn stop_animating<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        ctx: &RenderContext,
    ) -> TileResult<()> {
        self.clock.stop();
        if !ctx.game_mode {
            let active = self.grid.borrow().active_frame();
            self.set_frame(gpu, active as i64)?;
        }
        Ok(())
    }

    // ── source / visibility / placement ───────────────────────────────────

    /// Switches to another grid. On failure the renderable keeps its old grid
    /// and buffers untouched.
    pub fn rebind_source<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        grid: SharedGrid,
    ) -> TileResult<()> {
        self.ensure_live()?;

        let (buffers, frame, extent) = {
            let g = grid.borrow();
            validate_source(&g)?;
            let frame = self.frame % g.frame_count();
            (BufferSet::create(gpu, &g, frame)?, frame, art_extent(&g))
        };

        let mut old = std::mem::replace(&mut self.buffers, buffers);
        old.destroy(gpu);
        if !Rc::ptr_eq(&self.grid, &grid) {
            self.grid.borrow_mut().unregister(self.id);
            grid.borrow_mut().register(self.id, &self.invalidation);
        }
        self.invalidation.take();

        self.grid = grid;
        self.frame = frame;
        self.placement.set_extent(extent);
        log::debug!("renderable {:?}: rebound, frame {frame}", self.id);
        Ok(())
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Starts a linear move; see [`Placement::move_to`].
    pub fn move_to(
        &mut self,
        ctx: &RenderContext,
        x: f32,
        y: f32,
        z: f32,
        travel_secs: Option<f32>,
    ) {
        self.placement
            .move_to(Vec3::new(x, y, z), travel_secs, ctx.frame_time_ms);
    }

    pub fn snap_to(&mut self, x: f32, y: f32, z: f32) {
        self.placement.snap_to(Vec3::new(x, y, z));
    }

    /// Releases GPU buffers, then leaves the grid's subscriber set.
    ///
    /// Calling it again is a no-op; any other call afterwards returns
    /// [`TileError::UseAfterDestroy`].
    pub fn destroy<G: TileGpu + ?Sized>(&mut self, gpu: &mut G) {
        if self.destroyed {
            return;
        }
        self.buffers.destroy(gpu);
        self.grid.borrow_mut().unregister(self.id);
        self.clock.stop();
        self.destroyed = true;
        log::debug!("renderable {:?}: destroyed", self.id);
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn ensure_live(&self) -> TileResult<()> {
        if self.destroyed {
            log::warn!("renderable {:?}: used after destroy", self.id);
            return Err(TileError::UseAfterDestroy);
        }
        Ok(())
    }

    fn resolve(&self, ctx: &RenderContext) -> Resolved {
        let mode = if self.exporting {
            ViewMode::ExportFlattened
        } else {
            self.view_mode
        };
        self.placement.resolve(mode, ctx)
    }

    /// Displays `frame` (already in range), uploading only when it changed.
    ///
    /// The displayed frame only moves once its attributes are on the GPU.
    fn show_frame<G: TileGpu + ?Sized>(&mut self, gpu: &mut G, frame: usize) -> TileResult<()> {
        self.sync_buffers(gpu)?;
        if self.buffers.frame() != frame {
            let g = self.grid.borrow();
            self.buffers
                .update_tile_attributes(gpu, &g, frame, TileAttrs::all())?;
        }
        self.frame = frame;
        Ok(())
    }

    /// Applies edits the grid has broadcast since the last sync. On failure
    /// the invalidation is kept for the next attempt.
    fn sync_buffers<G: TileGpu + ?Sized>(&mut self, gpu: &mut G) -> TileResult<()> {
        let (attrs, geometry) = self.invalidation.take();
        if attrs.is_empty() && !geometry {
            return Ok(());
        }

        let result = self.apply_invalidation(gpu, attrs, geometry);
        if result.is_err() {
            self.invalidation.mark(attrs, geometry);
        }
        result
    }

    fn apply_invalidation<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        attrs: TileAttrs,
        geometry: bool,
    ) -> TileResult<()> {
        let g = self.grid.borrow();
        validate_source(&g)?;
        let frame = self.frame % g.frame_count();
        if geometry {
            self.buffers.update_geometry(gpu, &g, frame)?;
            self.placement.set_extent(art_extent(&g));
        } else {
            self.buffers.update_tile_attributes(gpu, &g, frame, attrs)?;
        }
        self.frame = frame;
        Ok(())
    }

    /// Copies the anchor transform. Returns `false` when there is no live anchor.
    fn follow_anchor(&mut self) -> bool {
        let Some(anchor) = self.anchor.as_ref().and_then(Weak::upgrade) else {
            return false;
        };
        self.placement.follow(&anchor.anchor_state());
        true
    }
}

impl Drop for TileRenderable {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!(
                "renderable {:?} dropped without destroy(); its buffer set is leaked until the backend drops",
                self.id
            );
            if let Ok(mut g) = self.grid.try_borrow_mut() {
                g.unregister(self.id);
            }
        }
    }
}

fn art_extent(grid: &TileGrid) -> Vec2 {
    let (qw, qh) = grid.quad_size();
    Vec2::new(grid.width() as f32 * qw, grid.height() as f32 * qh)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::render::tiles::{GpuCall, RecordingGpu};
    use crate::tile::{AnchorState, Tile};

    fn grid(frames: usize, layers: usize) -> SharedGrid {
        TileGrid::new(4, 2, frames, layers).shared()
    }

    fn renderable(gpu: &mut RecordingGpu, grid: &SharedGrid) -> TileRenderable {
        TileRenderable::create(gpu, grid.clone(), None).unwrap()
    }

    // ── frames ────────────────────────────────────────────────────────────

    #[test]
    fn set_frame_wraps_any_integer() {
        let mut gpu = RecordingGpu::new();
        let g = grid(5, 1);
        let mut r = renderable(&mut gpu, &g);

        for i in [-11_i64, -5, -1, 0, 3, 5, 7, 1_000_003] {
            r.set_frame(&mut gpu, i).unwrap();
            assert_eq!(r.frame() as i64, i.rem_euclid(5), "index {i}");
        }
        r.destroy(&mut gpu);
    }

    #[test]
    fn advance_and_rewind_wrap() {
        let mut gpu = RecordingGpu::new();
        let g = grid(3, 1);
        let mut r = renderable(&mut gpu, &g);

        r.rewind_frame(&mut gpu).unwrap();
        assert_eq!(r.frame(), 2);
        r.advance_frame(&mut gpu).unwrap();
        assert_eq!(r.frame(), 0);
        r.destroy(&mut gpu);
    }

    #[test]
    fn frame_switch_uploads_all_attributes_once() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 1);
        let mut r = renderable(&mut gpu, &g);

        r.set_frame(&mut gpu, 1).unwrap();
        r.set_frame(&mut gpu, 1).unwrap();
        assert_eq!(gpu.attribute_uploads(), vec![TileAttrs::all()]);
        r.destroy(&mut gpu);
    }

    #[test]
    fn failed_frame_upload_keeps_displayed_frame() {
        let mut gpu = RecordingGpu::new();
        let g = grid(3, 1);
        let mut r = renderable(&mut gpu, &g);

        gpu.fail_allocations(true);
        assert!(r.set_frame(&mut gpu, 2).is_err());
        assert_eq!(r.frame(), 0);
        assert_eq!(r.buffers.frame(), 0);

        gpu.fail_allocations(false);
        r.set_frame(&mut gpu, 2).unwrap();
        assert_eq!(r.frame(), 2);
        r.destroy(&mut gpu);
    }

    // ── structural edits ──────────────────────────────────────────────────

    #[test]
    fn added_layer_draws_within_resized_buffers() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 2);
        let mut r = renderable(&mut gpu, &g);
        g.borrow_mut().add_layer("fx");

        let ctx = RenderContext::default();
        r.update(&mut gpu, &ctx, 16.0).unwrap();
        assert_eq!(r.render(&mut gpu, &ctx, None, None, 1.0), Ok(3));
        assert_eq!(r.buffers.element_count(), 3 * 48);
        assert!(gpu.draws().all(|d| d.elements.end <= 3 * 48));
        assert_eq!(gpu.draws().last().map(|d| d.elements.clone()), Some(96..144));
        r.destroy(&mut gpu);
    }

    #[test]
    fn render_alone_picks_up_added_layer() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let mut r = renderable(&mut gpu, &g);
        g.borrow_mut().add_layer("fx");

        let ctx = RenderContext::default();
        assert_eq!(r.render(&mut gpu, &ctx, None, None, 1.0), Ok(2));
        let regrown = |c: &GpuCall| matches!(c, GpuCall::UploadGeometry { indices: 96, .. });
        assert!(gpu.calls().iter().any(regrown));
        r.destroy(&mut gpu);
    }

    #[test]
    fn removed_layer_does_not_break_frame_stepping() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 2);
        let mut r = renderable(&mut gpu, &g);
        assert!(g.borrow_mut().remove_layer(1));

        r.advance_frame(&mut gpu).unwrap();
        assert_eq!(r.frame(), 1);
        assert_eq!(r.buffers.element_count(), 48);
        r.destroy(&mut gpu);
    }

    #[test]
    fn playback_survives_resize() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 1);
        let mut r = renderable(&mut gpu, &g);
        r.start_animating();
        g.borrow_mut().resize(2, 2);

        r.update(&mut gpu, &RenderContext::default(), 100.0).unwrap();
        assert_eq!(r.frame(), 1);
        assert_eq!(r.buffers.element_count(), 2 * 2 * 6);
        assert_eq!(r.width(), 2.0);
        r.destroy(&mut gpu);
    }

    // ── animation ─────────────────────────────────────────────────────────

    #[test]
    fn update_plays_through_holds() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 1);
        g.borrow_mut().set_hold(1, 0.2);
        let mut r = renderable(&mut gpu, &g);
        let ctx = RenderContext::default();

        r.start_animating();
        r.update(&mut gpu, &ctx, 100.0).unwrap();
        assert_eq!(r.frame(), 1);
        r.update(&mut gpu, &ctx, 200.0).unwrap();
        assert_eq!(r.frame(), 0);
        r.destroy(&mut gpu);
    }

    #[test]
    fn paused_game_world_freezes_clock() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 1);
        let mut r = renderable(&mut gpu, &g);
        let frozen = RenderContext {
            game_mode: true,
            world_paused: true,
            ..Default::default()
        };

        r.start_animating();
        r.update(&mut gpu, &frozen, 10_000.0).unwrap();
        assert_eq!(r.frame(), 0);

        // Nothing accumulated while frozen.
        let running = RenderContext {
            world_paused: false,
            ..frozen
        };
        r.update(&mut gpu, &running, 50.0).unwrap();
        assert_eq!(r.frame(), 0);
        r.destroy(&mut gpu);
    }

    #[test]
    fn stop_snaps_to_active_frame_only_outside_game_mode() {
        let mut gpu = RecordingGpu::new();
        let g = grid(4, 1);
        g.borrow_mut().set_active_frame(1);
        let mut r = renderable(&mut gpu, &g);

        r.start_animating();
        r.set_frame(&mut gpu, 3).unwrap();
        let game = RenderContext {
            game_mode: true,
            ..Default::default()
        };
        r.stop_animating(&mut gpu, &game).unwrap();
        assert!(!r.is_animating());
        assert_eq!(r.frame(), 3);

        r.start_animating();
        r.stop_animating(&mut gpu, &RenderContext::default()).unwrap();
        assert_eq!(r.frame(), 1);
        r.destroy(&mut gpu);
    }

    // ── render ────────────────────────────────────────────────────────────

    #[test]
    fn invisible_renderable_touches_no_gpu_state() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 3);
        let mut r = renderable(&mut gpu, &g);
        gpu.clear();

        r.set_visible(false);
        let drawn = r
            .render(&mut gpu, &RenderContext::default(), None, None, 1.0)
            .unwrap();
        assert_eq!(drawn, 0);
        assert!(gpu.calls().is_empty());
        r.destroy(&mut gpu);
    }

    #[test]
    fn layers_draw_back_to_front_with_blend_bracket() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 3);
        {
            let mut g = g.borrow_mut();
            g.set_layer_z(0, 3.0);
            g.set_layer_z(1, 1.0);
            g.set_layer_z(2, 2.0);
        }
        let mut r = renderable(&mut gpu, &g);
        gpu.clear();

        let drawn = r
            .render(&mut gpu, &RenderContext::default(), None, None, 1.0)
            .unwrap();
        assert_eq!(drawn, 3);
        assert_eq!(gpu.drawn_layers(), vec![1, 2, 0]);

        let calls = gpu.calls();
        assert_eq!(calls[0], GpuCall::BindProgram);
        assert_eq!(calls[1], GpuCall::SetBlending(true));
        assert_eq!(calls.last(), Some(&GpuCall::SetBlending(false)));
        r.destroy(&mut gpu);
    }

    #[test]
    fn draws_carry_layer_ranges_and_resolved_depth() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 2);
        let mut r = renderable(&mut gpu, &g);
        r.snap_to(1.0, 2.0, 0.5);
        gpu.clear();

        r.render(&mut gpu, &RenderContext::default(), Some(1), None, 0.5)
            .unwrap();
        let draw = gpu.draws().next().unwrap().clone();
        assert_eq!(draw.elements, 48..96);
        assert_eq!(draw.position, Vec3::new(1.0, 2.0, 0.55));
        assert_eq!(draw.brightness, 0.5);

        gpu.clear();
        r.render(&mut gpu, &RenderContext::default(), Some(1), Some(9.0), 1.0)
            .unwrap();
        assert_eq!(gpu.draws().next().unwrap().position.z, 9.0);
        r.destroy(&mut gpu);
    }

    #[test]
    fn grid_edits_reach_every_subscriber() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let mut a = renderable(&mut gpu, &g);
        let mut b = renderable(&mut gpu, &g);
        assert_eq!(g.borrow().subscriber_count(), 2);

        g.borrow_mut().set_tile(0, 0, 0, 0, Tile::new(7, 0, 0));
        g.borrow_mut().commit_pending();

        let ctx = RenderContext::default();
        a.update(&mut gpu, &ctx, 0.0).unwrap();
        b.update(&mut gpu, &ctx, 0.0).unwrap();
        for r in [&a, &b] {
            let id = r.buffers.id().unwrap();
            assert_eq!(gpu.chars(id).unwrap()[0], 7);
        }
        a.destroy(&mut gpu);
        b.destroy(&mut gpu);
    }

    // ── export ────────────────────────────────────────────────────────────

    #[test]
    fn export_restores_interactive_state() {
        let mut gpu = RecordingGpu::new();
        let g = grid(3, 2);
        g.borrow_mut().set_active_layer(1);
        let mut r = renderable(&mut gpu, &g);
        r.set_frame(&mut gpu, 1).unwrap();
        let ctx = RenderContext {
            editing: Some(g.borrow().id()),
            inactive_layer_visibility: InactiveLayerVisibility::Hidden,
            ..Default::default()
        };

        for k in 0..3 {
            gpu.clear();
            let captured = r
                .render_frame_for_export(&mut gpu, &ctx, k, |gpu: &mut RecordingGpu| {
                    Ok::<_, TileError>(gpu.draws().cloned().collect::<Vec<_>>())
                })
                .unwrap();

            // Both layers at full strength, flattened to one depth, identity camera.
            assert_eq!(captured.len(), 2);
            assert!(captured.iter().all(|d| d.alpha == 1.0));
            assert!(captured.iter().all(|d| d.position == Vec3::new(-1.0, 1.0, 0.0)));
            assert!(captured.iter().all(|d| d.projection == glam::Mat4::IDENTITY));

            assert_eq!(r.frame(), 1);
            assert!(!r.is_exporting());
            assert_eq!(ctx.inactive_layer_visibility, InactiveLayerVisibility::Hidden);
        }
        r.destroy(&mut gpu);
    }

    #[test]
    fn export_hides_previews_and_puts_them_back() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        g.borrow_mut().set_tile(0, 0, 0, 0, Tile::new(1, 0, 0));
        g.borrow_mut().commit_pending();
        let mut r = renderable(&mut gpu, &g);
        g.borrow_mut().apply_preview(0, 0, 0, 0, Tile::new(99, 0, 0));
        g.borrow_mut().commit_pending();

        let id = r.buffers.id().unwrap();
        let ctx = RenderContext::default();
        let seen = r
            .render_frame_for_export(&mut gpu, &ctx, 0, |gpu: &mut RecordingGpu| {
                Ok::<_, TileError>(gpu.chars(id).unwrap()[0])
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(g.borrow().preview_edits().len(), 1);
        assert_eq!(g.borrow().tile(0, 0, 0, 0), Some(Tile::new(99, 0, 0)));
        r.destroy(&mut gpu);
    }

    #[test]
    fn export_renders_hidden_renderable() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let mut r = renderable(&mut gpu, &g);
        r.set_visible(false);

        let ctx = RenderContext::default();
        let n = r
            .render_frame_for_export(&mut gpu, &ctx, 0, |gpu: &mut RecordingGpu| {
                Ok::<_, TileError>(gpu.draw_count())
            })
            .unwrap();
        assert_eq!(n, 1);
        assert!(!r.is_visible());
        r.destroy(&mut gpu);
    }

    // ── placement ─────────────────────────────────────────────────────────

    #[test]
    fn move_to_default_rate_arrives_exactly() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let mut r = renderable(&mut gpu, &g);
        let ctx = RenderContext {
            frame_time_ms: 16.0,
            ..Default::default()
        };

        r.move_to(&ctx, 10.0, 0.0, 0.0, None);
        let ticks = (10.0 / crate::tile::DEFAULT_MOVE_RATE).ceil() as usize;
        for _ in 0..ticks - 1 {
            let before = r.position().x;
            r.update(&mut gpu, &ctx, 16.0).unwrap();
            assert!(r.position().x > before);
            assert!(r.is_moving());
        }
        r.update(&mut gpu, &ctx, 16.0).unwrap();
        assert_eq!(r.position(), Vec3::new(10.0, 0.0, 0.0));
        assert!(!r.is_moving());
        r.destroy(&mut gpu);
    }

    struct Sprite(Cell<Vec3>);

    impl Anchor for Sprite {
        fn anchor_state(&self) -> AnchorState {
            AnchorState {
                position: self.0.get(),
                ..Default::default()
            }
        }
    }

    #[test]
    fn anchored_renderable_tracks_anchor_until_it_drops() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let sprite = Rc::new(Sprite(Cell::new(Vec3::new(2.0, 3.0, 0.0))));
        let weak: Weak<dyn Anchor> = Rc::downgrade(&(sprite.clone() as Rc<dyn Anchor>));
        let mut r = TileRenderable::create(&mut gpu, g.clone(), Some(weak)).unwrap();
        assert_eq!(r.position(), Vec3::new(2.0, 3.0, 0.0));

        let ctx = RenderContext::default();
        sprite.0.set(Vec3::new(5.0, 5.0, 1.0));
        r.update(&mut gpu, &ctx, 16.0).unwrap();
        assert_eq!(r.position(), Vec3::new(5.0, 5.0, 1.0));

        drop(sprite);
        r.update(&mut gpu, &ctx, 16.0).unwrap();
        assert_eq!(r.position(), Vec3::new(5.0, 5.0, 1.0));
        r.destroy(&mut gpu);
    }

    // ── rebinding / teardown ──────────────────────────────────────────────

    #[test]
    fn rebind_to_shorter_grid_renormalizes_frame() {
        let mut gpu = RecordingGpu::new();
        let long = grid(8, 1);
        let short = grid(3, 2);
        let mut r = renderable(&mut gpu, &long);
        r.set_frame(&mut gpu, 7).unwrap();

        r.rebind_source(&mut gpu, short.clone()).unwrap();
        assert_eq!(r.frame(), 1);
        assert_eq!(gpu.live_sets(), 1);
        assert_eq!(long.borrow().subscriber_count(), 0);
        assert!(short.borrow().is_subscribed(r.id()));
        r.destroy(&mut gpu);
    }

    #[test]
    fn rebind_to_empty_grid_keeps_old_binding() {
        let mut gpu = RecordingGpu::new();
        let g = grid(2, 1);
        let mut r = renderable(&mut gpu, &g);
        let before = r.buffers.id();

        let empty = TileGrid::new(4, 2, 0, 1).shared();
        let err = r.rebind_source(&mut gpu, empty).unwrap_err();
        assert!(matches!(err, TileError::InvalidSource { frames: 0, .. }));
        assert_eq!(r.buffers.id(), before);
        assert!(g.borrow().is_subscribed(r.id()));
        r.destroy(&mut gpu);
    }

    #[test]
    fn destroy_releases_then_unregisters_and_is_idempotent() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let mut r = renderable(&mut gpu, &g);

        r.destroy(&mut gpu);
        r.destroy(&mut gpu);
        assert_eq!(gpu.live_sets(), 0);
        assert_eq!(gpu.double_releases(), 0);
        assert_eq!(g.borrow().subscriber_count(), 0);

        let ctx = RenderContext::default();
        assert_eq!(
            r.render(&mut gpu, &ctx, None, None, 1.0),
            Err(TileError::UseAfterDestroy)
        );
        assert_eq!(r.update(&mut gpu, &ctx, 1.0), Err(TileError::UseAfterDestroy));
    }

    #[test]
    fn dropping_without_destroy_still_unsubscribes() {
        let mut gpu = RecordingGpu::new();
        let g = grid(1, 1);
        let r = renderable(&mut gpu, &g);
        drop(r);
        assert_eq!(g.borrow().subscriber_count(), 0);
    }
}
