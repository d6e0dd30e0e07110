use crate::config::MappingProfile;
use crate::device::{DeviceSource, RawDevice, USER_MAX_COUNT};
use crate::error::{Result, ShimError};

/// One controller slot: its immutable profile, the lazily bound raw device,
/// and the per-motor force-effect readiness markers.
pub struct Slot {
    pub profile: MappingProfile,
    pub device: Option<Box<dyn RawDevice>>,
    pub force_ready: [bool; 2],
}

/// Fixed table of the four controller slots. Guarded by a single mutex at
/// the call boundary; slot count and call frequency are both low.
pub struct DeviceRegistry {
    slots: [Slot; USER_MAX_COUNT],
    source: Box<dyn DeviceSource>,
    /// Marker for switch-in detection: the slot whose acquisition last
    /// ran, successfully or not. A failed attempt is not retried while the
    /// marker still points at the slot; it re-runs on a fresh switch-in or
    /// after the bound handle is dropped (device removed).
    last_active: Option<usize>,
}

impl DeviceRegistry {
    pub fn new(profiles: [MappingProfile; USER_MAX_COUNT], source: Box<dyn DeviceSource>) -> Self {
        Self {
            slots: profiles.map(|profile| Slot {
                profile,
                device: None,
                force_ready: [false, false],
            }),
            source,
            last_active: None,
        }
    }

    pub fn profile(&self, index: usize) -> &MappingProfile {
        &self.slots[index].profile
    }

    pub fn is_bound(&self, index: usize) -> bool {
        self.slots[index].device.is_some()
    }

    /// Return the slot with a bound device, acquiring one first if needed.
    ///
    /// Acquisition requires a usable vendor/product identity (defaulted from
    /// the words of the configured product dword) and runs once per
    /// switch-in: while the marker still points at this slot a previous
    /// failed attempt is not repeated, so a polling loop does not hammer
    /// the source every frame. On success force effects are attached.
    pub fn resolve(&mut self, index: usize) -> Result<&mut Slot> {
        if self.slots[index].device.is_some() {
            return Ok(&mut self.slots[index]);
        }

        let profile = &self.slots[index].profile;
        let vid = profile.effective_vid();
        let pid = profile.effective_pid();
        if vid == 0 || pid == 0 {
            return Err(ShimError::NotBound(index));
        }
        if self.last_active == Some(index) {
            return Err(ShimError::NotBound(index));
        }

        log::info!(
            "Initializing gamepad {} (vid {:04X} pid {:04X}, last active {:?})",
            index + 1,
            vid,
            pid,
            self.last_active
        );

        self.last_active = Some(index);
        match self.source.acquire(index, vid, pid) {
            Ok(device) => {
                let slot = &mut self.slots[index];
                slot.device = Some(device);
                slot.force_ready = [false, false];
                if slot.profile.use_force {
                    if let Some(device) = slot.device.as_mut() {
                        crate::ffb::prepare(device.as_mut(), &mut slot.force_ready, &slot.profile);
                    }
                }
                log::info!("Gamepad {} enumeration finished", index + 1);
                Ok(&mut self.slots[index])
            }
            Err(e) => {
                log::warn!("Acquisition for gamepad {} failed: {}", index + 1, e);
                Err(ShimError::Acquisition(index, e.to_string()))
            }
        }
    }

    /// Drop the bound handle so the next call re-acquires (device removal).
    pub fn drop_device(&mut self, index: usize) {
        self.slots[index].device = None;
        self.slots[index].force_ready = [false, false];
        if self.last_active == Some(index) {
            self.last_active = None;
        }
    }

    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.device = None;
            slot.force_ready = [false, false];
        }
        self.last_active = None;
    }
}

/// Source used when no host integration registered one: every acquisition
/// fails soft, so all slots report not-connected.
pub struct DisconnectedSource;

impl DeviceSource for DisconnectedSource {
    fn acquire(&mut self, slot: usize, _vid: u16, _pid: u16) -> Result<Box<dyn RawDevice>> {
        Err(ShimError::Acquisition(
            slot,
            "no raw sample provider registered".into(),
        ))
    }
}
