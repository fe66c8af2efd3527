use serde::Serialize;

use crate::MeterConfig;

/// Colour band of a level bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterZone {
    /// Below 40% of the bar.
    Low,
    /// Below 75% of the bar.
    Mid,
    High,
}

/// What a device's level bar shows for one UI refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeterReading {
    /// Filled steps, `0..=steps`.
    pub fill: u32,
    pub steps: u32,
    pub zone: MeterZone,
    /// Level is loud enough to highlight the device.
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct LevelMeter {
    scale: f32,
    activity_threshold: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(&MeterConfig::default())
    }
}

impl LevelMeter {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            scale: config.scale,
            activity_threshold: config.activity_threshold,
        }
    }

    pub fn read(&self, level: f32) -> MeterReading {
        let level = if level.is_finite() { level.max(0.0) } else { 0.0 };
        let fill = (level * self.scale).min(self.scale) as u32;
        let fill_f = fill as f32;

        let zone = if fill_f < self.scale * 0.4 {
            MeterZone::Low
        } else if fill_f < self.scale * 0.75 {
            MeterZone::Mid
        } else {
            MeterZone::High
        };

        MeterReading {
            fill,
            steps: self.scale as u32,
            zone,
            active: level >= self.activity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_an_empty_inactive_bar() {
        let reading = LevelMeter::default().read(0.0);
        assert_eq!(reading.fill, 0);
        assert_eq!(reading.steps, 200);
        assert_eq!(reading.zone, MeterZone::Low);
        assert!(!reading.active);
    }

    #[test]
    fn zones_follow_fill_fraction() {
        let meter = LevelMeter::default();
        assert_eq!(meter.read(0.1).zone, MeterZone::Low);
        assert_eq!(meter.read(0.5).zone, MeterZone::Mid);
        assert_eq!(meter.read(0.8).zone, MeterZone::High);
    }

    #[test]
    fn loud_levels_saturate() {
        let reading = LevelMeter::default().read(12.0);
        assert_eq!(reading.fill, 200);
        assert_eq!(reading.zone, MeterZone::High);
    }

    #[test]
    fn activity_uses_threshold() {
        let meter = LevelMeter::default();
        assert!(!meter.read(0.0009).active);
        assert!(meter.read(0.001).active);
        assert!(!meter.read(f32::NAN).active);
    }
}
