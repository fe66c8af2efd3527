//! Core library for the Audio Ripples visualiser.
//!
//! Audio devices are sampled on their own monitor threads and reduced to one
//! loudness value each ([`LevelStore`]). Once per simulation tick the
//! [`SimulationDriver`] sums the selected levels, disturbs a [`WaveField`] with
//! the active [`DisturbanceMode`] and integrates the field one step. The
//! presentation layer renders the field through [`ColorGradient`] on its own
//! clock.

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod levels;
pub mod meter;
pub mod monitor;
pub mod render;
pub mod simulation;
pub mod timeline;

pub use audio::{AudioBackend, CaptureRequest, CaptureStream, CpalBackend, DeviceHandle, DeviceId};
pub use config::{
    AppConfig, AudioConfig, DisturbanceConfig, MeterConfig, RenderConfig, RippleShape,
    SimulationConfig, TimingConfig,
};
pub use driver::{SimulationDriver, TickReport};
pub use error::{Result, RipplesError};
pub use levels::LevelStore;
pub use meter::{LevelMeter, MeterReading, MeterZone};
pub use monitor::{DeviceMonitor, MonitorRegistry, StartOutcome};
pub use render::{map_to_color, ColorBuffer, ColorGradient};
pub use simulation::{DisturbanceMode, Disturber, WaveField};
pub use timeline::FixedTimestep;
