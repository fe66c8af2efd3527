//! Per-device capture threads and the selection state that drives them.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, SyncSender},
        Arc,
    },
    thread,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{compute_rms, AudioBackend, CaptureRequest, DeviceHandle, DeviceId},
    AudioConfig, LevelStore, Result, RipplesError,
};

/// What [`MonitorRegistry::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new monitor opened its stream and is running.
    Spawned,
    /// A monitor for the device was already running.
    AlreadyRunning,
}

/// Desired (`selected`) and actual (`running`) monitoring state. Both sets
/// live under one lock so a monitor can observe its deselection and give up
/// its running slot atomically.
#[derive(Debug, Default)]
struct Selection {
    selected: HashSet<DeviceId>,
    running: HashSet<DeviceId>,
}

/// Tracks which devices should be monitored and starts at most one
/// [`DeviceMonitor`] per device.
pub struct MonitorRegistry {
    backend: Arc<dyn AudioBackend>,
    levels: Arc<LevelStore>,
    config: AudioConfig,
    selection: Arc<Mutex<Selection>>,
    devices: Mutex<HashMap<DeviceId, DeviceHandle>>,
}

impl MonitorRegistry {
    pub fn new(backend: Arc<dyn AudioBackend>, levels: Arc<LevelStore>, config: AudioConfig) -> Self {
        Self {
            backend,
            levels,
            config,
            selection: Arc::new(Mutex::new(Selection::default())),
            devices: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    pub fn levels(&self) -> &Arc<LevelStore> {
        &self.levels
    }

    /// Remembers device handles so they can later be selected by id.
    pub fn register_devices(&self, devices: &[DeviceHandle]) {
        let mut known = self.devices.lock();
        for device in devices {
            known.insert(device.id, device.clone());
        }
    }

    /// Re-enumerates the backend and registers every device it reports.
    pub fn refresh_devices(&self) -> Result<Vec<DeviceHandle>> {
        let devices = self.backend.enumerate()?;
        self.register_devices(&devices);
        Ok(devices)
    }

    pub fn device(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.lock().get(&id).cloned()
    }

    /// Marks `id` as selected and starts its monitor when the handle is known.
    ///
    /// Returns `Ok(None)` when the device has not been registered yet. Selecting
    /// a device whose previous monitor failed starts a fresh one.
    pub fn select(&self, id: DeviceId) -> Result<Option<StartOutcome>> {
        self.selection.lock().selected.insert(id);

        match self.device(id) {
            Some(device) => self.start(&device).map(Some),
            None => {
                debug!(id, "selected device has no registered handle");
                Ok(None)
            }
        }
    }

    /// Removes `id` from the selection. Its monitor notices on its next read
    /// and exits, leaving the last published level in place.
    pub fn deselect(&self, id: DeviceId) -> bool {
        self.selection.lock().selected.remove(&id)
    }

    /// Deselects every device when all of them are selected, otherwise selects
    /// them all. Returns whether the devices are now selected.
    pub fn toggle_all(&self, devices: &[DeviceHandle]) -> bool {
        self.register_devices(devices);

        let all_selected = {
            let selection = self.selection.lock();
            devices
                .iter()
                .all(|device| selection.selected.contains(&device.id))
        };

        if all_selected {
            for device in devices {
                self.deselect(device.id);
            }
            return false;
        }

        self.select_all(devices);
        true
    }

    /// Selects every device in `devices`, leaving already selected ones alone.
    /// A device that fails to open is logged and stays selected.
    pub fn select_all(&self, devices: &[DeviceHandle]) {
        self.register_devices(devices);

        for device in devices {
            if let Err(err) = self.select(device.id) {
                warn!(id = device.id, error = %err, "could not start monitor");
            }
        }
    }

    pub fn is_selected(&self, id: DeviceId) -> bool {
        self.selection.lock().selected.contains(&id)
    }

    pub fn is_running(&self, id: DeviceId) -> bool {
        self.selection.lock().running.contains(&id)
    }

    /// Point-in-time copy of the selection, sorted by id.
    pub fn selected_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.selection.lock().selected.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn running_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.selection.lock().running.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Spawns a monitor for `device` unless one is already running, and waits
    /// until it has opened its stream.
    ///
    /// An open failure is returned here after the monitor has published 0 and
    /// exited. Later read failures are only visible as a 0 level.
    pub fn start(&self, device: &DeviceHandle) -> Result<StartOutcome> {
        if !self.selection.lock().running.insert(device.id) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let (opened_tx, opened_rx) = mpsc::sync_channel(1);
        let monitor = DeviceMonitor {
            device: device.clone(),
            backend: Arc::clone(&self.backend),
            levels: Arc::clone(&self.levels),
            config: self.config.clone(),
            slot: RunningSlot {
                id: device.id,
                selection: Arc::clone(&self.selection),
                held: true,
            },
        };

        thread::Builder::new()
            .name(format!("monitor-{}", device.id))
            .spawn(move || monitor.run(opened_tx))
            .map_err(|err| RipplesError::device(device.id, format!("spawning monitor: {err}")))?;

        match opened_rx.recv() {
            Ok(Ok(())) => Ok(StartOutcome::Spawned),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RipplesError::device(
                device.id,
                "monitor exited before opening its stream",
            )),
        }
    }
}

impl std::fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let selection = self.selection.lock();
        f.debug_struct("MonitorRegistry")
            .field("selected", &selection.selected)
            .field("running", &selection.running)
            .field("devices", &self.devices.lock().len())
            .finish()
    }
}

/// Capture loop for one device. Runs on its own thread until the device is
/// deselected or its stream fails.
pub struct DeviceMonitor {
    device: DeviceHandle,
    backend: Arc<dyn AudioBackend>,
    levels: Arc<LevelStore>,
    config: AudioConfig,
    slot: RunningSlot,
}

impl DeviceMonitor {
    fn run(mut self, opened: SyncSender<Result<()>>) {
        let id = self.device.id;
        let request = CaptureRequest::for_device(&self.device, &self.config);

        let mut stream = match self.backend.open_capture(&self.device, &request) {
            Ok(stream) => {
                let _ = opened.send(Ok(()));
                stream
            }
            Err(err) => {
                warn!(device = %self.device.name, id, error = %err, "failed to open capture stream");
                self.levels.set(id, 0.0);
                self.slot.release();
                let _ = opened.send(Err(err));
                return;
            }
        };

        info!(device = %self.device.name, id, channels = stream.channels(), "monitor started");
        let timeout = self.config.read_timeout();

        loop {
            if !self.slot.still_selected() {
                info!(device = %self.device.name, id, "monitor stopped");
                return;
            }

            match stream.read(self.config.chunk_frames, timeout) {
                Ok(samples) if samples.is_empty() => thread::yield_now(),
                Ok(samples) => self.levels.set(id, compute_rms(&samples)),
                Err(err) => {
                    warn!(device = %self.device.name, id, error = %err, "capture stream failed");
                    self.levels.set(id, 0.0);
                    return;
                }
            }
        }
    }
}

/// A monitor's entry in the running set, given back exactly once.
struct RunningSlot {
    id: DeviceId,
    selection: Arc<Mutex<Selection>>,
    held: bool,
}

impl RunningSlot {
    /// Returns true while the device is selected. Otherwise releases the slot
    /// under the same lock, so a concurrent `select` either keeps this monitor
    /// alive or sees the slot free and spawns a new one.
    fn still_selected(&mut self) -> bool {
        let mut selection = self.selection.lock();
        if selection.selected.contains(&self.id) {
            return true;
        }
        selection.running.remove(&self.id);
        self.held = false;
        false
    }

    fn release(&mut self) {
        if self.held {
            self.selection.lock().running.remove(&self.id);
            self.held = false;
        }
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.release();
    }
}
