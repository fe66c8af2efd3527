use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::audio::DeviceId;

/// Latest amplitude per device, shared between capture threads and the driver.
///
/// Each device owns one atomic slot. The map itself is only write-locked the
/// first time a device publishes, so publishes for different devices never
/// wait on each other and readers never observe a torn value.
#[derive(Debug, Default)]
pub struct LevelStore {
    slots: RwLock<HashMap<DeviceId, Arc<LevelSlot>>>,
}

impl LevelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last published amplitude, or 0.0 if none was published.
    pub fn get(&self, id: DeviceId) -> f32 {
        self.slots
            .read()
            .get(&id)
            .map(|slot| slot.load())
            .unwrap_or(0.0)
    }

    /// Publishes `amplitude` for `id`. Negative or non-finite values are
    /// stored as silence.
    pub fn set(&self, id: DeviceId, amplitude: f32) {
        let amplitude = sanitize(amplitude);

        if let Some(slot) = self.slots.read().get(&id) {
            slot.store(amplitude);
            return;
        }

        self.slots
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(LevelSlot::default()))
            .store(amplitude);
    }

    /// Ids that have published at least once.
    pub fn known_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.slots.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Default)]
struct LevelSlot {
    bits: AtomicU32,
}

impl LevelSlot {
    fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn store(&self, amplitude: f32) {
        self.bits.store(amplitude.to_bits(), Ordering::Release);
    }
}

fn sanitize(amplitude: f32) -> f32 {
    if amplitude.is_finite() && amplitude > 0.0 {
        amplitude
    } else {
        0.0
    }
}
