use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    audio::{AudioBackend, DeviceHandle, DeviceId},
    meter::{LevelMeter, MeterReading},
    monitor::{MonitorRegistry, StartOutcome},
    render::{ColorBuffer, ColorGradient},
    simulation::{DisturbanceMode, Disturber, WaveField},
    AppConfig, LevelStore, Result,
};

/// Outcome of one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Frame number produced by this tick, starting at 1.
    pub frame: u64,
    /// Scaled sum of the selected devices' levels.
    pub amplitude: f32,
    /// Whether the amplitude cleared the disturbance threshold.
    pub disturbed: bool,
}

/// Owns the wave field and connects it to the captured levels.
///
/// Ticking needs `&mut self`, so the field is never advanced concurrently
/// with itself or with rendering.
pub struct SimulationDriver {
    registry: MonitorRegistry,
    levels: Arc<LevelStore>,
    field: WaveField,
    disturber: Disturber,
    mode: DisturbanceMode,
    gradient: ColorGradient,
    meter: LevelMeter,
    damping: f32,
    amplitude_scale: f32,
    frame: u64,
    rendered_frame: u64,
}

impl SimulationDriver {
    /// Validates `config` and builds a zeroed field.
    pub fn new(config: &AppConfig, backend: Arc<dyn AudioBackend>) -> Result<Self> {
        config.validate()?;

        let levels = Arc::new(LevelStore::new());
        let registry = MonitorRegistry::new(backend, Arc::clone(&levels), config.audio.clone());
        let field = WaveField::new(config.simulation.rows, config.simulation.cols)?;

        info!(
            rows = field.rows(),
            cols = field.cols(),
            damping = config.simulation.damping,
            seeded = config.disturbance.seed.is_some(),
            "simulation driver ready"
        );

        Ok(Self {
            registry,
            levels,
            field,
            disturber: Disturber::new(config.disturbance.clone()),
            mode: DisturbanceMode::default(),
            gradient: ColorGradient::new(&config.render),
            meter: LevelMeter::new(&config.meter),
            damping: config.simulation.damping,
            amplitude_scale: config.simulation.amplitude_scale,
            frame: 0,
            rendered_frame: 0,
        })
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn field(&self) -> &WaveField {
        &self.field
    }

    /// Enumerates devices through the backend and makes them selectable.
    pub fn refresh_devices(&self) -> Result<Vec<DeviceHandle>> {
        self.registry.refresh_devices()
    }

    pub fn select(&self, id: DeviceId) -> Result<Option<StartOutcome>> {
        self.registry.select(id)
    }

    pub fn deselect(&self, id: DeviceId) -> bool {
        self.registry.deselect(id)
    }

    pub fn toggle_all(&self, devices: &[DeviceHandle]) -> bool {
        self.registry.toggle_all(devices)
    }

    pub fn select_all(&self, devices: &[DeviceHandle]) {
        self.registry.select_all(devices)
    }

    /// Selects the host's default output device, if there is one.
    pub fn select_default_output(&self) -> Result<Option<DeviceHandle>> {
        let Some(device) = self.registry.backend().default_output()? else {
            debug!("no default output device");
            return Ok(None);
        };
        self.registry.register_devices(std::slice::from_ref(&device));
        self.registry.select(device.id)?;
        Ok(Some(device))
    }

    pub fn current_level(&self, id: DeviceId) -> f32 {
        self.levels.get(id)
    }

    pub fn meter_reading(&self, id: DeviceId) -> MeterReading {
        self.meter.read(self.levels.get(id))
    }

    pub fn disturbance_mode(&self) -> DisturbanceMode {
        self.mode
    }

    pub fn set_disturbance_mode(&mut self, mode: DisturbanceMode) {
        if mode != self.mode {
            debug!(from = %self.mode, to = %mode, "disturbance mode changed");
        }
        self.mode = mode;
    }

    /// Scaled sum of the latest level of every selected device. Each level is
    /// read independently, so devices may contribute from slightly different
    /// instants.
    pub fn aggregate_level(&self) -> f32 {
        let sum: f32 = self
            .registry
            .selected_ids()
            .into_iter()
            .map(|id| self.levels.get(id))
            .sum();
        sum * self.amplitude_scale
    }

    /// Disturbs the field with the aggregate level and advances it one step.
    pub fn tick_simulation(&mut self) -> TickReport {
        let amplitude = self.aggregate_level();
        let disturbed = self.disturber.apply(self.mode, &mut self.field, amplitude);
        self.field.advance(self.damping);
        self.frame += 1;

        TickReport {
            frame: self.frame,
            amplitude,
            disturbed,
        }
    }

    /// Number of completed ticks.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// True when a tick has completed since the last [`render_frame`](Self::render_frame).
    pub fn frame_ready(&self) -> bool {
        self.frame != self.rendered_frame
    }

    /// Maps the current field to colours and marks the frame as shown.
    pub fn render_frame(&mut self) -> ColorBuffer {
        self.rendered_frame = self.frame;
        self.gradient.map(&self.field)
    }
}

impl std::fmt::Debug for SimulationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("registry", &self.registry)
            .field("rows", &self.field.rows())
            .field("cols", &self.field.cols())
            .field("mode", &self.mode)
            .field("frame", &self.frame)
            .finish()
    }
}
