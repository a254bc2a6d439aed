use crate::config::Config;
use crate::palette::Palette;
use crate::sim::{compute, Grid};
use crate::term::Surface;
use anyhow::Result;
use rand::rngs::StdRng;

pub(crate) struct Renderer {
    palette: Palette,
    rng: StdRng,
}

impl Renderer {
    pub(crate) fn new(palette: Palette, rng: StdRng) -> Self {
        Self { palette, rng }
    }

    /// One frame: advance every cell, draw it, publish the new field.
    ///
    /// Simulation row 0 lands on the bottom line of the surface; the top line
    /// and the last column are left as margin.
    pub(crate) fn pass<S: Surface + ?Sized>(
        &mut self,
        grid: &mut Grid,
        config: &Config,
        surface: &mut S,
    ) -> Result<()> {
        let rows = grid.rows();
        for r in 0..rows {
            let y = (rows - r) as u16;
            for c in 0..grid.cols() {
                let intensity = compute(grid, r, c, config, &mut self.rng);
                surface.put(
                    c as u16,
                    y,
                    self.palette.glyph_for(intensity),
                    self.palette.color_for(intensity),
                );
                grid.write(r, c, intensity);
            }
        }
        grid.swap();
        surface.refresh()
    }
}
