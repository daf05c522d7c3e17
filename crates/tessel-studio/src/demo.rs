//! Built-in demo artwork: a bouncing disc over a checker field with a framed
//! border and a spinning arrow.

use tessel_engine::tile::{SharedGrid, Tile, TileGrid, UvMod};

use crate::glyphs;

pub const BACKGROUND: usize = 0;
pub const SPRITES: usize = 1;
pub const OVERLAY: usize = 2;

/// Builds the demo grid. `width`/`height` are clamped to at least 4, `frames`
/// to at least 1.
pub fn build(width: u32, height: u32, frames: usize, hold_secs: f64) -> SharedGrid {
    let (width, height, frames) = (width.max(4), height.max(4), frames.max(1));
    let mut grid = TileGrid::new(width, height, frames, 3);

    for frame in 0..frames {
        grid.set_hold(frame, hold_secs);
        grid.fill_layer(frame, BACKGROUND, Tile::new(glyphs::CHECKER, 1, 0));

        let (x, y) = bounce(frame, frames, width, height);
        grid.set_tile(frame, SPRITES, x, y, Tile::new(glyphs::DISC, 8 + (frame % 4) as u32, 0));
        if let Some(trail_x) = x.checked_sub(1) {
            grid.set_tile(frame, SPRITES, trail_x, y, Tile::new(glyphs::DISC, 2, 0));
        }

        for x in 0..width {
            grid.set_tile(frame, OVERLAY, x, 0, Tile::new(glyphs::FRAME, 7, 5));
            grid.set_tile(frame, OVERLAY, x, height - 1, Tile::new(glyphs::FRAME, 7, 5));
        }
        for y in 1..height - 1 {
            grid.set_tile(frame, OVERLAY, 0, y, Tile::new(glyphs::FRAME, 7, 5));
            grid.set_tile(frame, OVERLAY, width - 1, y, Tile::new(glyphs::FRAME, 7, 5));
        }

        let spin = UvMod::from_raw((frame % 4) as u32);
        grid.set_tile(
            frame,
            OVERLAY,
            width / 2,
            height / 2,
            Tile::new(glyphs::ARROW, 10, 0).with_uv(spin),
        );
    }

    grid.shared()
}

/// Disc position for `frame`: left to right inside the border, bobbing on y.
fn bounce(frame: usize, frames: usize, width: u32, height: u32) -> (u32, u32) {
    let inner_w = width - 2;
    let inner_h = height - 2;
    let x = 1 + (frame as u32 * inner_w / frames as u32).min(inner_w - 1);
    let y = 1 + (frame as u32 % inner_h.max(1)).min(inner_h - 1);
    (x, y)
}
