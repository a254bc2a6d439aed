use crate::config::Config;
use rand::Rng;

pub(crate) const MAX_INTENSITY: u32 = 100;

/// Sub-linear falloff exponent: the flame thins out gradually as it climbs.
const FADE_EXPONENT: f64 = 0.3;

/// The row that keeps feeding heat into the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HeatSource {
    pub(crate) intensity: u32,
    pub(crate) offset: u32,
    pub(crate) height: u32,
}

impl From<&Config> for HeatSource {
    fn from(c: &Config) -> Self {
        Self {
            intensity: c.start_intensity.min(MAX_INTENSITY),
            offset: c.start_offset,
            height: c.start_height,
        }
    }
}

/* -----------------------------
   Grid: previous frame in, current frame out
------------------------------ */

/// Intensity field, one cell smaller than the surface in each direction.
///
/// Row 0 is the bottom of the fire. Reads go to `prev`, writes to `next`,
/// and [`Grid::swap`] publishes a finished frame, so a pass never sees a
/// half-updated frame no matter what order it walks the cells in.
pub(crate) struct Grid {
    rows: usize,
    cols: usize,
    prev: Vec<u32>,
    next: Vec<u32>,
    source: HeatSource,
}

impl Grid {
    pub(crate) fn new(source: HeatSource) -> Self {
        Self {
            rows: 0,
            cols: 0,
            prev: Vec::new(),
            next: Vec::new(),
            source,
        }
    }

    /// Reallocates for a `height × width` surface and cools every cell.
    pub(crate) fn resize(&mut self, height: u16, width: u16) {
        self.rows = height.saturating_sub(1) as usize;
        self.cols = width.saturating_sub(1) as usize;
        let n = self.rows * self.cols;
        self.prev = vec![0; n];
        self.next = vec![0; n];
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    /// Previous-frame intensity at `(r, c)` with the edge and heat-source rules
    /// applied. Coordinates may be out of range.
    pub(crate) fn read(&self, r: i64, c: i64) -> u32 {
        let src = self.source;
        let source_row = src.height as i64 - 1;
        if r < source_row {
            return 0;
        }
        if r == source_row {
            let width = self.cols as i64 + 1;
            let offset = src.offset as i64;
            return if offset <= c && c <= width - offset {
                src.intensity
            } else {
                0
            };
        }
        if c < 0 || c >= self.cols as i64 || r >= self.rows as i64 {
            return 0;
        }
        self.prev[r as usize * self.cols + c as usize].min(MAX_INTENSITY)
    }

    /// Stores this frame's intensity; it becomes readable after [`Grid::swap`].
    pub(crate) fn write(&mut self, r: usize, c: usize, intensity: u32) {
        if r < self.rows && c < self.cols {
            self.next[r * self.cols + c] = intensity.min(MAX_INTENSITY);
        }
    }

    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.next);
    }

    #[cfg(test)]
    pub(crate) fn stored(&self, r: usize, c: usize) -> u32 {
        self.prev[r * self.cols + c]
    }

    #[cfg(test)]
    pub(crate) fn cells(&self) -> &[u32] {
        &self.prev
    }
}

/* -----------------------------
   Intensity model
------------------------------ */

fn fade(row: usize, start_height: u32) -> f64 {
    let start = start_height as usize;
    if row >= start {
        ((row - start + 1) as f64).powf(FADE_EXPONENT)
    } else {
        1.0
    }
}

/// New intensity for `(row, col)`: a random draw between half and all of the
/// heat in the three cells beneath it, faded by height and scaled.
pub(crate) fn compute<R: Rng>(
    grid: &Grid,
    row: usize,
    col: usize,
    config: &Config,
    rng: &mut R,
) -> u32 {
    let (below, c) = (row as i64 - 1, col as i64);
    let sum = grid.read(below, c - 1) + grid.read(below, c) + grid.read(below, c + 1);
    let drawn = rng.gen_range(sum / 2..=sum);
    let v = drawn as f64 / fade(row, config.start_height) * config.scale;
    // `as` saturates and maps NaN to 0
    (v as i64).clamp(0, MAX_INTENSITY as i64) as u32
}
