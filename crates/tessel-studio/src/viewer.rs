//! Interactive window: plays the art and exposes the editor-side toggles.
//!
//! Keys: Space play/stop, Left/Right step, E edit mode, Tab inactive-layer
//! visibility, L next layer, H show hidden layers, V hide active layer,
//! G game mode, P pause world, Esc quit.

use anyhow::{Context, Result};
use glam::Vec2;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowId;

use tessel_engine::coords::ColorRgba;
use tessel_engine::core::{App, AppControl, FrameCtx};
use tessel_engine::render::RenderCtx;
use tessel_engine::render::tiles::{CharsetAtlas, TileRenderer, TileRendererConfig};
use tessel_engine::tile::{Camera, RenderContext, SharedGrid, TileRenderable};

use crate::glyphs;

/// World units of margin around the art.
const MARGIN: f32 = 1.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Command {
    TogglePlay,
    Step(i64),
    ToggleEdit,
    CycleInactive,
    NextLayer,
    ToggleHiddenLayers,
    ToggleActiveLayer,
    ToggleGameMode,
    TogglePause,
}

fn command_for(key: &Key) -> Option<Command> {
    match key {
        Key::Named(NamedKey::Space) => Some(Command::TogglePlay),
        Key::Named(NamedKey::ArrowRight) => Some(Command::Step(1)),
        Key::Named(NamedKey::ArrowLeft) => Some(Command::Step(-1)),
        Key::Named(NamedKey::Tab) => Some(Command::CycleInactive),
        Key::Character(c) => match c.to_ascii_lowercase().as_str() {
            "e" => Some(Command::ToggleEdit),
            "l" => Some(Command::NextLayer),
            "h" => Some(Command::ToggleHiddenLayers),
            "v" => Some(Command::ToggleActiveLayer),
            "g" => Some(Command::ToggleGameMode),
            "p" => Some(Command::TogglePause),
            _ => None,
        },
        _ => None,
    }
}

/// GPU-side state, created on the first frame once a device exists.
struct Scene {
    renderer: TileRenderer,
    art: TileRenderable,
}

impl Scene {
    fn new(rctx: &RenderCtx<'_>, grid: SharedGrid, animate: bool) -> Result<Self> {
        let atlas = CharsetAtlas::from_coverage(
            rctx.device,
            rctx.queue,
            glyphs::COLUMNS,
            glyphs::ROWS,
            glyphs::CELL,
            glyphs::CELL,
            &glyphs::coverage(),
        )?;
        let mut renderer = TileRenderer::new(rctx, atlas, TileRendererConfig::default());
        let mut art = TileRenderable::create(&mut renderer, grid, None)
            .context("failed to create tile renderable")?;
        if animate {
            art.start_animating();
        }
        Ok(Self { renderer, art })
    }

    fn apply(&mut self, ctx: &mut RenderContext, cmd: Command) -> Result<()> {
        let grid = self.art.shared_grid().clone();
        match cmd {
            Command::TogglePlay => {
                if self.art.is_animating() {
                    self.art.stop_animating(&mut self.renderer, ctx)?;
                } else {
                    self.art.start_animating();
                }
            }
            Command::Step(delta) => {
                self.art.set_frame(&mut self.renderer, self.art.frame() as i64 + delta)?;
                grid.borrow_mut().set_active_frame(self.art.frame());
            }
            Command::ToggleEdit => {
                let id = grid.borrow().id();
                ctx.editing = if ctx.is_editing(id) { None } else { Some(id) };
            }
            Command::CycleInactive => {
                ctx.inactive_layer_visibility = ctx.inactive_layer_visibility.next();
            }
            Command::NextLayer => {
                let mut g = grid.borrow_mut();
                let next = (g.active_layer() + 1) % g.layer_count();
                g.set_active_layer(next);
            }
            Command::ToggleHiddenLayers => ctx.show_hidden_layers = !ctx.show_hidden_layers,
            Command::ToggleActiveLayer => {
                let mut g = grid.borrow_mut();
                let layer = g.active_layer();
                let visible = g.layer(layer).is_some_and(|l| l.visible);
                g.set_layer_visible(layer, !visible);
            }
            Command::ToggleGameMode => ctx.game_mode = !ctx.game_mode,
            Command::TogglePause => ctx.world_paused = !ctx.world_paused,
        }
        log::debug!("{cmd:?}: frame {}, {ctx:?}", self.art.frame());
        Ok(())
    }
}

pub struct Viewer {
    grid: SharedGrid,
    animate: bool,
    clear: ColorRgba,
    ctx: RenderContext,
    scene: Option<Scene>,
    pending: Vec<Command>,
}

impl Viewer {
    pub fn new(grid: SharedGrid, animate: bool, clear: ColorRgba) -> Self {
        Self {
            grid,
            animate,
            clear,
            ctx: RenderContext::default(),
            scene: None,
            pending: Vec::new(),
        }
    }

    fn frame(&mut self, frame: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        if self.scene.is_none() {
            let scene = Scene::new(&frame.render_ctx(), self.grid.clone(), self.animate)?;
            self.scene = Some(scene);
        }
        let Some(scene) = self.scene.as_mut() else {
            return Ok(AppControl::Continue);
        };

        for cmd in self.pending.drain(..) {
            scene.apply(&mut self.ctx, cmd)?;
        }

        self.ctx.advance(&frame.time);
        self.ctx.camera = fit_camera(scene.art.width(), scene.art.height(), frame.window.aspect());

        scene.art.update(&mut scene.renderer, &self.ctx, frame.time.dt_ms)?;
        scene.art.render(&mut scene.renderer, &self.ctx, None, None, 1.0)?;

        let renderer = &mut scene.renderer;
        Ok(frame.render(self.clear, |_, target| {
            renderer.flush(target, None);
        }))
    }
}

impl App for Viewer {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        if let WindowEvent::KeyboardInput {
            event: KeyEvent {
                logical_key,
                state: ElementState::Pressed,
                ..
            },
            ..
        } = event
        {
            if *logical_key == Key::Named(NamedKey::Escape) {
                return AppControl::Exit;
            }
            if let Some(cmd) = command_for(logical_key) {
                self.pending.push(cmd);
            }
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        match self.frame(ctx) {
            Ok(control) => control,
            Err(e) => {
                log::error!("viewer frame failed: {e:#}");
                AppControl::Exit
            }
        }
    }

    fn on_exit(&mut self) {
        if let Some(mut scene) = self.scene.take() {
            scene.art.destroy(&mut scene.renderer);
        }
    }
}

/// Orthographic camera framing a `width x height` piece of art anchored at
/// the origin (growing right and down), with [`MARGIN`] on every side.
fn fit_camera(width: f32, height: f32, aspect: f32) -> Camera {
    let center = Vec2::new(width / 2.0, -height / 2.0);
    let half_height = (height / 2.0).max(width / 2.0 / aspect.max(f32::EPSILON)) + MARGIN;
    Camera::orthographic(center, half_height, aspect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(command_for(&Key::Named(NamedKey::Space)), Some(Command::TogglePlay));
        assert_eq!(command_for(&Key::Named(NamedKey::ArrowLeft)), Some(Command::Step(-1)));
        assert_eq!(command_for(&Key::Character("E".into())), Some(Command::ToggleEdit));
        assert_eq!(command_for(&Key::Character("z".into())), None);
        assert_eq!(command_for(&Key::Named(NamedKey::Escape)), None);
    }

    #[test]
    fn camera_keeps_art_on_screen() {
        for aspect in [0.5, 1.0, 2.0] {
            let cam = fit_camera(24.0, 16.0, aspect);
            let mvp = cam.projection * cam.view;
            for corner in [Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(24.0, -16.0, 0.0, 1.0)] {
                let clip = mvp * corner;
                assert!(clip.x.abs() < 1.0 && clip.y.abs() < 1.0, "{aspect}: {clip:?}");
            }
        }
    }
}
