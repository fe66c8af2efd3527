use std::{fmt, str::FromStr};

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::WaveField;
use crate::{
    config::{DisturbanceConfig, RippleShape},
    RipplesError,
};

/// How the driving amplitude is injected into the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisturbanceMode {
    /// Random interior cells are set to the amplitude.
    #[default]
    Point,
    /// Quadratic ripples added around random centres.
    Circle,
    /// Wider, stronger ripples with a softer falloff.
    BlueShadow,
}

impl DisturbanceMode {
    pub const ALL: [Self; 3] = [Self::Point, Self::Circle, Self::BlueShadow];

    pub fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Circle => "circle",
            Self::BlueShadow => "blue-shadow",
        }
    }
}

impl fmt::Display for DisturbanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DisturbanceMode {
    type Err = RipplesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "point" => Ok(Self::Point),
            "circle" => Ok(Self::Circle),
            "blue-shadow" | "blueshadow" | "shadow" => Ok(Self::BlueShadow),
            other => Err(RipplesError::msg(format!(
                "unknown disturbance mode `{other}` (expected point, circle or blue-shadow)"
            ))),
        }
    }
}

/// Injects disturbances using an owned, optionally seeded random source.
#[derive(Debug)]
pub struct Disturber {
    config: DisturbanceConfig,
    rng: StdRng,
}

impl Disturber {
    pub fn new(config: DisturbanceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &DisturbanceConfig {
        &self.config
    }

    /// Applies `mode` once. Returns false, leaving the field untouched, when
    /// `amplitude` does not exceed the threshold.
    pub fn apply(&mut self, mode: DisturbanceMode, field: &mut WaveField, amplitude: f32) -> bool {
        if !(amplitude > self.config.threshold) {
            return false;
        }

        match mode {
            DisturbanceMode::Point => {
                splash(field, amplitude, self.config.count, &mut self.rng)
            }
            DisturbanceMode::Circle => scatter_ripples(
                field,
                amplitude,
                self.config.count,
                &self.config.circle,
                &mut self.rng,
            ),
            DisturbanceMode::BlueShadow => scatter_ripples(
                field,
                amplitude,
                self.config.count,
                &self.config.blue_shadow,
                &mut self.rng,
            ),
        }
        true
    }
}

/// Overwrites `count` distinct random interior cells with `amplitude`.
fn splash(field: &mut WaveField, amplitude: f32, count: usize, rng: &mut impl Rng) {
    let inner_cols = field.cols() - 2;
    let interior = (field.rows() - 2) * inner_cols;

    for cell in index::sample(rng, interior, count.min(interior)) {
        field.set(1 + cell / inner_cols, 1 + cell % inner_cols, amplitude);
    }
}

fn scatter_ripples(
    field: &mut WaveField,
    amplitude: f32,
    count: usize,
    shape: &RippleShape,
    rng: &mut impl Rng,
) {
    for _ in 0..count {
        let row = centre_in(field.rows(), shape.margin, rng);
        let col = centre_in(field.cols(), shape.margin, rng);
        let radius = rng.gen_range(shape.min_radius..=shape.max_radius);
        ripple(field, (row, col), radius, amplitude * shape.gain, shape.exponent);
    }
}

/// Uniform position at least `margin` cells from either end. The margin
/// shrinks on axes too short to honour it.
fn centre_in(len: usize, margin: usize, rng: &mut impl Rng) -> usize {
    let low = margin.min((len - 1) / 2);
    rng.gen_range(low..=len - 1 - low)
}

/// Adds `peak * (1 - d / radius)^exponent` to every in-bounds cell within
/// `radius` of `center` (row, col).
pub fn ripple(field: &mut WaveField, center: (usize, usize), radius: usize, peak: f32, exponent: f32) {
    if radius == 0 {
        return;
    }
    let (rows, cols) = (field.rows() as isize, field.cols() as isize);
    let reach = radius as isize;
    let radius = radius as f32;

    for dy in -reach..=reach {
        let row = center.0 as isize + dy;
        if row < 0 || row >= rows {
            continue;
        }
        for dx in -reach..=reach {
            let col = center.1 as isize + dx;
            if col < 0 || col >= cols {
                continue;
            }
            let distance = ((dx * dx + dy * dy) as f32).sqrt();
            if distance > radius {
                continue;
            }
            let falloff = (1.0 - distance / radius).powf(exponent);
            field.add(row as usize, col as usize, peak * falloff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> Disturber {
        Disturber::new(DisturbanceConfig {
            seed: Some(seed),
            ..DisturbanceConfig::default()
        })
    }

    fn nonzero_cells(field: &WaveField) -> usize {
        field.current().iter().filter(|&&v| v != 0.0).count()
    }

    #[test]
    fn quiet_input_leaves_field_untouched() {
        let mut disturber = seeded(1);
        let mut field = WaveField::new(120, 120).unwrap();
        field.set(60, 60, 0.3);
        let before = field.current().to_vec();

        for mode in DisturbanceMode::ALL {
            assert!(!disturber.apply(mode, &mut field, 0.0001));
            assert!(!disturber.apply(mode, &mut field, 0.0));
            assert!(!disturber.apply(mode, &mut field, f32::NAN));
        }
        assert_eq!(field.current(), before.as_slice());
    }

    #[test]
    fn point_sets_exactly_count_interior_cells() {
        let mut disturber = seeded(2);
        let mut field = WaveField::new(200, 200).unwrap();

        assert!(disturber.apply(DisturbanceMode::Point, &mut field, 1.0));

        assert_eq!(nonzero_cells(&field), 10);
        assert!(field.current().iter().all(|&v| v == 0.0 || v == 1.0));
        for i in 0..200 {
            assert_eq!(field.get(0, i), 0.0);
            assert_eq!(field.get(199, i), 0.0);
            assert_eq!(field.get(i, 0), 0.0);
            assert_eq!(field.get(i, 199), 0.0);
        }
    }

    #[test]
    fn point_overwrites_instead_of_adding() {
        let mut disturber = seeded(3);
        let mut field = WaveField::new(3, 3).unwrap();
        field.set(1, 1, 5.0);

        disturber.apply(DisturbanceMode::Point, &mut field, 0.5);

        assert_eq!(field.get(1, 1), 0.5);
        assert_eq!(nonzero_cells(&field), 1);
    }

    #[test]
    fn ripple_has_quadratic_falloff() {
        let mut field = WaveField::new(201, 201).unwrap();
        ripple(&mut field, (100, 100), 20, 2.0, 2.0);

        assert!((field.get(100, 100) - 2.0).abs() < 1e-6);
        // half way out: 2 * 0.5^2
        assert!((field.get(100, 110) - 0.5).abs() < 1e-6);
        assert_eq!(field.get(100, 120), 0.0);
        assert_eq!(field.get(120, 100), 0.0);
        assert_eq!(field.get(100, 121), 0.0);
        assert_eq!(field.get(115, 115), 0.0);
    }

    #[test]
    fn ripple_adds_to_existing_heights() {
        let mut field = WaveField::new(50, 50).unwrap();
        field.set(25, 25, 1.0);
        ripple(&mut field, (25, 25), 5, 1.5, 1.5);

        assert!((field.get(25, 25) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn ripple_clips_at_grid_edges() {
        let mut field = WaveField::new(10, 10).unwrap();
        ripple(&mut field, (0, 9), 4, 1.0, 2.0);

        assert_eq!(field.get(0, 9), 1.0);
        assert!(field.get(0, 8) > 0.0);
        assert_eq!(field.get(9, 0), 0.0);
    }

    #[test]
    fn circle_respects_margin_and_is_additive() {
        let mut disturber = seeded(4);
        let mut field = WaveField::new(201, 201).unwrap();

        assert!(disturber.apply(DisturbanceMode::Circle, &mut field, 1.0));

        assert!(field.energy() > 0.0);
        assert!(field.current().iter().all(|&v| v >= 0.0 && v <= 10.0));
        // margin 50 minus the largest radius 40 leaves a 10 cell quiet border
        for i in 0..201 {
            for border in 0..10 {
                assert_eq!(field.get(border, i), 0.0);
                assert_eq!(field.get(i, border), 0.0);
                assert_eq!(field.get(200 - border, i), 0.0);
                assert_eq!(field.get(i, 200 - border), 0.0);
            }
        }
    }

    #[test]
    fn blue_shadow_is_stronger_than_its_amplitude() {
        let mut disturber = seeded(5);
        let mut field = WaveField::new(301, 301).unwrap();

        assert!(disturber.apply(DisturbanceMode::BlueShadow, &mut field, 1.0));

        let peak = field.current().iter().copied().fold(f32::MIN, f32::max);
        assert!(peak > 1.0);
        assert!(field.current().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn same_seed_reproduces_placement() {
        let mut a = WaveField::new(150, 150).unwrap();
        let mut b = WaveField::new(150, 150).unwrap();

        for mode in DisturbanceMode::ALL {
            seeded(9).apply(mode, &mut a, 0.8);
            seeded(9).apply(mode, &mut b, 0.8);
        }
        assert_eq!(a.current(), b.current());
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("point".parse::<DisturbanceMode>().unwrap(), DisturbanceMode::Point);
        assert_eq!("Circle".parse::<DisturbanceMode>().unwrap(), DisturbanceMode::Circle);
        assert_eq!(
            "blue_shadow".parse::<DisturbanceMode>().unwrap(),
            DisturbanceMode::BlueShadow
        );
        assert!("splash".parse::<DisturbanceMode>().is_err());
        assert_eq!(DisturbanceMode::BlueShadow.to_string(), "blue-shadow");
    }
}
