use crate::{simulation::WaveField, RenderConfig};

/// RGB888 image, row-major, three bytes per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl ColorBuffer {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw interleaved RGB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, row: usize, col: usize) -> [u8; 3] {
        let i = (row * self.width + col) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }
}

/// Blue-dominant linear gradient with per-frame normalisation.
#[derive(Debug, Clone)]
pub struct ColorGradient {
    gains: [f32; 3],
    epsilon: f32,
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl ColorGradient {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            gains: [config.red, config.green, config.blue],
            epsilon: config.epsilon,
        }
    }

    /// Maps the current heights of `field` to colours.
    ///
    /// Heights are normalised against this frame's own minimum and maximum,
    /// so the same height may render differently from one frame to the next.
    /// A flat field maps to one uniform colour.
    pub fn map(&self, field: &WaveField) -> ColorBuffer {
        let values = field.current();
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = max - min + self.epsilon;

        let mut data = Vec::with_capacity(values.len() * 3);
        for &value in values {
            let norm = ((value - min) / span).clamp(0.0, 1.0);
            // float to int `as` saturates and truncates
            data.extend(self.gains.iter().map(|gain| (norm * gain) as u8));
        }

        ColorBuffer {
            width: field.cols(),
            height: field.rows(),
            data,
        }
    }
}

/// Maps `field` with the default gradient.
pub fn map_to_color(field: &WaveField) -> ColorBuffer {
    ColorGradient::default().map(field)
}
