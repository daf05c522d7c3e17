//! Procedural charset used when no atlas is supplied.
//!
//! 16x16 glyphs of 8x8 pixels. The first few glyphs are fixed shapes the demo
//! draws with; the rest are deterministic 4x4 block patterns.

pub const COLUMNS: u32 = 16;
pub const ROWS: u32 = 16;
pub const CELL: u32 = 8;

pub const EMPTY: u32 = 0;
pub const BLOCK: u32 = 1;
pub const CHECKER: u32 = 2;
pub const FRAME: u32 = 3;
pub const DISC: u32 = 4;
pub const DIAGONAL: u32 = 5;
pub const UPPER_HALF: u32 = 6;
pub const ARROW: u32 = 7;

/// Builds the coverage bitmap, one byte per pixel, row-major.
pub fn coverage() -> Vec<u8> {
    let width = COLUMNS * CELL;
    let height = ROWS * CELL;
    let mut out = vec![0u8; (width * height) as usize];

    for glyph in 0..COLUMNS * ROWS {
        let (gx, gy) = ((glyph % COLUMNS) * CELL, (glyph / COLUMNS) * CELL);
        for y in 0..CELL {
            for x in 0..CELL {
                if covered(glyph, x, y) {
                    out[((gy + y) * width + gx + x) as usize] = 255;
                }
            }
        }
    }
    out
}

fn covered(glyph: u32, x: u32, y: u32) -> bool {
    let last = CELL - 1;
    match glyph {
        EMPTY => false,
        BLOCK => true,
        CHECKER => (x + y) % 2 == 0,
        FRAME => x == 0 || y == 0 || x == last || y == last,
        DISC => {
            let (dx, dy) = (x as f32 - 3.5, y as f32 - 3.5);
            dx * dx + dy * dy <= 12.5
        }
        DIAGONAL => x == y || x + 1 == y,
        UPPER_HALF => y < CELL / 2,
        // Points right; rotations come from the tile's uv mode.
        ARROW => {
            let mid = CELL / 2;
            ((y == mid - 1 || y == mid) && x < last - 1)
                || (x >= mid && y.abs_diff(mid) + mid <= x + 1)
        }
        _ => {
            let bits = scramble(glyph);
            bits & (1 << ((y / 2) * 4 + x / 2)) != 0
        }
    }
}

fn scramble(v: u32) -> u32 {
    let mut h = v.wrapping_mul(0x9e37_79b9);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^ (h >> 13)
}
