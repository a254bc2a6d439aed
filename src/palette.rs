use crate::sim::MAX_INTENSITY;
use crossterm::style::Color;

pub(crate) const NUM_PARTICLES: usize = 5;
pub(crate) const NUM_COLORS: usize = 30;

const PARTICLES: [char; NUM_PARTICLES] = [' ', '.', '*', '#', '@'];

/// Levels per half of the heat ramp.
const RAMP_STEPS: u8 = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl Rgb {
    fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Nearest slot in the xterm 6×6×6 color cube.
    pub(crate) fn to_ansi(self) -> u8 {
        16 + (self.r / 48) * 36 + (self.g / 48) * 6 + self.b / 48
    }

    fn to_color(self, true_color: bool) -> Color {
        if true_color {
            Color::Rgb {
                r: self.r,
                g: self.g,
                b: self.b,
            }
        } else {
            Color::AnsiValue(self.to_ansi())
        }
    }
}

/// Black → red, then red → yellow.
fn heat_ramp() -> Vec<Rgb> {
    let rise = (0..RAMP_STEPS).map(|k| Rgb::new(16 * k, 0, 0));
    let glow = (0..RAMP_STEPS).map(|k| Rgb::new(255, 16 * k, 0));
    rise.chain(glow).collect()
}

#[inline]
fn bucket(intensity: u32, buckets: usize) -> usize {
    let i = (intensity as usize * buckets) / MAX_INTENSITY as usize;
    i.min(buckets - 1)
}

pub(crate) fn glyph_index(intensity: u32) -> usize {
    bucket(intensity, NUM_PARTICLES)
}

pub(crate) fn color_index(intensity: u32) -> usize {
    bucket(intensity, NUM_COLORS)
}

pub(crate) struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    pub(crate) fn new(true_color: bool) -> Self {
        let colors = heat_ramp()
            .into_iter()
            .map(|c| c.to_color(true_color))
            .collect();
        Self { colors }
    }

    pub(crate) fn glyph_for(&self, intensity: u32) -> char {
        PARTICLES[glyph_index(intensity)]
    }

    pub(crate) fn color_for(&self, intensity: u32) -> Color {
        self.colors[color_index(intensity)]
    }
}
