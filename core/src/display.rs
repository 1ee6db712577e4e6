use crate::color::Chip8Color;

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;

/// Sprites are always 8 pixels wide, one bit per pixel, most significant bit first
const SPRITE_WIDTH: usize = 8;

/// Immutable copy of the 64x32 monochrome pixel grid, row major
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<bool>,
}

impl Frame {
    /// Coordinates wrap on both axes, like `Display::pixel`
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[(y % SCREEN_HEIGHT) * SCREEN_WIDTH + (x % SCREEN_WIDTH)]
    }

    pub fn pixels(&self) -> &[bool] {
        &self.pixels[..]
    }

    /// Expand the frame into one `Chip8Color` per pixel, ready for a streaming texture
    pub fn to_rgbx(&self, foreground: Chip8Color, background: Chip8Color) -> Vec<Chip8Color> {
        self.pixels
            .iter()
            .map(|on| if *on { foreground } else { background })
            .collect()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.pixels.chunks(SCREEN_WIDTH) {
            let line: String = row.iter().map(|on| if *on { '█' } else { '.' }).collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Display surface mutated by the clear (00E0) and draw (DXYN) instructions.
///
/// Coordinates wrap on both axes, so no draw can ever address a pixel outside the grid.
/// Every mutation marks the display dirty until the presenter collects the frame.
pub struct Display {
    pixels: Vec<bool>,
    dirty: bool,
}

impl Display {
    pub fn new() -> Display {
        Display {
            pixels: vec![false; SCREEN_WIDTH * SCREEN_HEIGHT],
            dirty: true,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.iter_mut().for_each(|p| *p = false);
        self.dirty = true;
    }

    /// XOR an 8 pixel wide sprite onto the display with its top left corner at `(x, y)`.
    ///
    /// Returns true if any pixel that was on got switched off.
    pub fn draw_sprite(&mut self, x: u8, y: u8, rows: &[u8]) -> bool {
        let mut collision = false;

        for (row, data) in rows.iter().enumerate() {
            let py = (y as usize + row) % SCREEN_HEIGHT;

            for column in 0..SPRITE_WIDTH {
                if data & (0x80 >> column) == 0 {
                    continue;
                }

                let px = (x as usize + column) % SCREEN_WIDTH;
                let idx = py * SCREEN_WIDTH + px;
                if self.pixels[idx] {
                    collision = true;
                }
                self.pixels[idx] ^= true;
            }
        }

        self.dirty = true;
        collision
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[(y % SCREEN_HEIGHT) * SCREEN_WIDTH + (x % SCREEN_WIDTH)]
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot(&self) -> Frame {
        Frame {
            pixels: self.pixels.clone(),
        }
    }

    /// Snapshot of the display if it changed since the last call
    pub fn take_dirty(&mut self) -> Option<Frame> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.snapshot())
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
