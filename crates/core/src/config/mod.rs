use std::{path::Path, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Result, RipplesError};

/// Top-level configuration structure for the application.
///
/// Every section falls back to its defaults, so a configuration file only needs
/// to mention the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub simulation: SimulationConfig,
    pub disturbance: DisturbanceConfig,
    pub render: RenderConfig,
    pub timing: TimingConfig,
    pub meter: MeterConfig,
}

impl AppConfig {
    /// Loads a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Rejects configurations that cannot drive a simulation.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.simulation.validate()?;
        self.disturbance
            .validate(self.simulation.rows, self.simulation.cols)?;
        self.render.validate()?;
        self.timing.validate()?;
        self.meter.validate()
    }
}

/// Configuration specific to the audio capture subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Upper bound on the number of channels requested from a device.
    pub max_channels: u16,
    /// Maximum number of frames folded into one level measurement.
    pub chunk_frames: usize,
    /// How long a monitor waits for samples before re-checking its selection.
    pub read_timeout_ms: u64,
    /// Buffer size requested from the host when it exposes a range.
    pub low_latency_frames: u32,
    /// Host APIs that can capture the output of a playback device.
    pub loopback_host_apis: Vec<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_channels: 2,
            chunk_frames: 1024,
            read_timeout_ms: 20,
            low_latency_frames: 256,
            loopback_host_apis: vec!["WASAPI".to_string()],
        }
    }
}

impl AudioConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Returns true when captures on `host_api` may use loopback.
    pub fn supports_loopback(&self, host_api: &str) -> bool {
        let host_api = host_api.to_ascii_uppercase();
        self.loopback_host_apis
            .iter()
            .any(|name| host_api.contains(&name.to_ascii_uppercase()))
    }

    fn validate(&self) -> Result<()> {
        if self.max_channels == 0 {
            return Err(RipplesError::config("audio.max_channels must be at least 1"));
        }
        if self.chunk_frames == 0 {
            return Err(RipplesError::config("audio.chunk_frames must be at least 1"));
        }
        if self.read_timeout_ms == 0 {
            return Err(RipplesError::config("audio.read_timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Grid geometry and integrator constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rows: usize,
    pub cols: usize,
    /// Multiplier applied to every interior cell each tick.
    pub damping: f32,
    /// Scale applied to the summed device levels before disturbing the field.
    pub amplitude_scale: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rows: 960,
            cols: 1200,
            damping: 0.995,
            amplitude_scale: 1.0,
        }
    }
}

impl SimulationConfig {
    fn validate(&self) -> Result<()> {
        if self.rows < 3 || self.cols < 3 {
            return Err(RipplesError::config(format!(
                "simulation grid must be at least 3x3, got {}x{}",
                self.rows, self.cols
            )));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(RipplesError::config(format!(
                "simulation.damping must lie in (0, 1], got {}",
                self.damping
            )));
        }
        if !self.amplitude_scale.is_finite() || self.amplitude_scale < 0.0 {
            return Err(RipplesError::config(format!(
                "simulation.amplitude_scale must be finite and non-negative, got {}",
                self.amplitude_scale
            )));
        }
        Ok(())
    }
}

/// Parameters shared by the three disturbance modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisturbanceConfig {
    /// Perturbations injected per tick.
    pub count: usize,
    /// Amplitudes at or below this value leave the field untouched.
    pub threshold: f32,
    #[serde(deserialize_with = "RippleShape::circle_over")]
    pub circle: RippleShape,
    #[serde(deserialize_with = "RippleShape::blue_shadow_over")]
    pub blue_shadow: RippleShape,
    /// Seed for disturbance placement. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for DisturbanceConfig {
    fn default() -> Self {
        Self {
            count: 10,
            threshold: 0.0001,
            circle: RippleShape::circle(),
            blue_shadow: RippleShape::blue_shadow(),
            seed: None,
        }
    }
}

impl DisturbanceConfig {
    fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(RipplesError::config(format!(
                "disturbance.threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        self.circle.validate("disturbance.circle", rows, cols)?;
        self.blue_shadow
            .validate("disturbance.blue_shadow", rows, cols)
    }
}

/// Radial falloff profile used by the circle and blue shadow modes.
///
/// A cell at distance `d <= r` from the centre receives
/// `amplitude * gain * (1 - d / r).powf(exponent)`.
///
/// In configuration files each field is optional and falls back to the
/// profile's own default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RippleShape {
    /// Minimum distance between a ripple centre and the grid edge.
    pub margin: usize,
    pub min_radius: usize,
    pub max_radius: usize,
    pub exponent: f32,
    pub gain: f32,
}

impl RippleShape {
    pub fn circle() -> Self {
        Self {
            margin: 50,
            min_radius: 20,
            max_radius: 40,
            exponent: 2.0,
            gain: 1.0,
        }
    }

    pub fn blue_shadow() -> Self {
        Self {
            margin: 50,
            min_radius: 40,
            max_radius: 80,
            exponent: 1.5,
            gain: 1.5,
        }
    }

    fn circle_over<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        Ok(RippleOverrides::deserialize(deserializer)?.apply(Self::circle()))
    }

    fn blue_shadow_over<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        Ok(RippleOverrides::deserialize(deserializer)?.apply(Self::blue_shadow()))
    }

    fn validate(&self, name: &str, rows: usize, cols: usize) -> Result<()> {
        if self.min_radius == 0 || self.max_radius < self.min_radius {
            return Err(RipplesError::config(format!(
                "{name}: radius range {}..={} is empty or zero",
                self.min_radius, self.max_radius
            )));
        }
        if rows <= 2 * self.margin || cols <= 2 * self.margin {
            return Err(RipplesError::config(format!(
                "{name}: margin {} does not fit a {rows}x{cols} grid",
                self.margin
            )));
        }
        if !(self.exponent.is_finite() && self.exponent > 0.0) {
            return Err(RipplesError::config(format!(
                "{name}: exponent must be positive, got {}",
                self.exponent
            )));
        }
        if !self.gain.is_finite() {
            return Err(RipplesError::config(format!("{name}: gain must be finite")));
        }
        Ok(())
    }
}

/// Ripple fields present in a configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RippleOverrides {
    margin: Option<usize>,
    min_radius: Option<usize>,
    max_radius: Option<usize>,
    exponent: Option<f32>,
    gain: Option<f32>,
}

impl RippleOverrides {
    fn apply(self, base: RippleShape) -> RippleShape {
        RippleShape {
            margin: self.margin.unwrap_or(base.margin),
            min_radius: self.min_radius.unwrap_or(base.min_radius),
            max_radius: self.max_radius.unwrap_or(base.max_radius),
            exponent: self.exponent.unwrap_or(base.exponent),
            gain: self.gain.unwrap_or(base.gain),
        }
    }
}

/// Per-channel gains of the blue gradient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    /// Added to the value range so flat fields never divide by zero.
    pub epsilon: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            red: 50.0,
            green: 180.0,
            blue: 255.0,
            epsilon: 1e-6,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        for (name, gain) in [("red", self.red), ("green", self.green), ("blue", self.blue)] {
            if !(gain.is_finite() && (0.0..=255.0).contains(&gain)) {
                return Err(RipplesError::config(format!(
                    "render.{name} must lie in [0, 255], got {gain}"
                )));
            }
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(RipplesError::config("render.epsilon must be positive"));
        }
        Ok(())
    }
}

/// Host timer cadence. Neither interval is load-bearing for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub simulation_interval_ms: u64,
    pub ui_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            simulation_interval_ms: 16,
            ui_interval_ms: 50,
        }
    }
}

impl TimingConfig {
    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_interval_ms)
    }

    pub fn ui_interval(&self) -> Duration {
        Duration::from_millis(self.ui_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.simulation_interval_ms == 0 || self.ui_interval_ms == 0 {
            return Err(RipplesError::config("timing intervals must be positive"));
        }
        Ok(())
    }
}

/// Level bar presentation constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Number of steps in a full bar. A level of `1 / scale` fills one step.
    pub scale: f32,
    /// Levels at or above this mark a device as active.
    pub activity_threshold: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            scale: 200.0,
            activity_threshold: 0.001,
        }
    }
}

impl MeterConfig {
    fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale >= 1.0) {
            return Err(RipplesError::config("meter.scale must be at least 1"));
        }
        if !self.activity_threshold.is_finite() || self.activity_threshold < 0.0 {
            return Err(RipplesError::config(
                "meter.activity_threshold must be non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            AppConfig::from_json(r#"{ "simulation": { "rows": 200, "cols": 300 } }"#).unwrap();

        assert_eq!(config.simulation.rows, 200);
        assert_eq!(config.simulation.cols, 300);
        assert!((config.simulation.damping - 0.995).abs() < f32::EPSILON);
        assert_eq!(config.disturbance.count, 10);
        assert_eq!(config.disturbance.blue_shadow, RippleShape::blue_shadow());
        config.validate().unwrap();
    }

    #[test]
    fn partial_ripple_section_keeps_profile_defaults() {
        let config = AppConfig::from_json(
            r#"{ "disturbance": { "circle": { "margin": 30 }, "blue_shadow": { "gain": 2.0 } } }"#,
        )
        .unwrap();

        assert_eq!(
            config.disturbance.circle,
            RippleShape {
                margin: 30,
                ..RippleShape::circle()
            }
        );
        assert_eq!(
            config.disturbance.blue_shadow,
            RippleShape {
                gain: 2.0,
                ..RippleShape::blue_shadow()
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn rejects_misspelled_ripple_field() {
        let err = AppConfig::from_json(r#"{ "disturbance": { "circle": { "radius": 30 } } }"#)
            .unwrap_err();
        assert!(matches!(err, RipplesError::Json(_)));
    }

    #[test]
    fn rejects_degenerate_grid() {
        let mut config = AppConfig::default();
        config.simulation.rows = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, RipplesError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_margin_that_does_not_fit() {
        let mut config = AppConfig::default();
        config.simulation.rows = 100;
        config.simulation.cols = 100;

        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("margin"));
    }

    #[test]
    fn rejects_reversed_radius_range() {
        let mut config = AppConfig::default();
        config.disturbance.circle.min_radius = 50;
        config.disturbance.circle.max_radius = 10;

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = AppConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, RipplesError::Json(_)));
    }

    #[test]
    fn loopback_matching_ignores_case() {
        let audio = AudioConfig::default();
        assert!(audio.supports_loopback("Windows WASAPI"));
        assert!(audio.supports_loopback("wasapi"));
        assert!(!audio.supports_loopback("ALSA"));
    }
}
