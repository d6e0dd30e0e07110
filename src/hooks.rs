use crate::config::{HookConfig, MappingProfile};
use crate::device::USER_MAX_COUNT;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const HOOK_NONE: u32 = 0;
/// Low-level input interception.
pub const HOOK_LL: u32 = 1;
/// Device enumeration interception.
pub const HOOK_ENUM: u32 = 1 << 1;
/// Device creation interception.
pub const HOOK_CREATE: u32 = 1 << 2;
/// Vendor/product identity spoofing.
pub const HOOK_PIDVID: u32 = 1 << 3;
/// Device name spoofing.
pub const HOOK_NAME: u32 = 1 << 4;
/// System device-probe interception.
pub const HOOK_PROBE: u32 = 1 << 5;
/// Trust-verification interception.
pub const HOOK_TRUST: u32 = 1 << 6;
/// Suppress the recovery watchdog.
pub const HOOK_NOTIMEOUT: u32 = 1 << 26;
/// Global off switch; wins over every category bit.
pub const HOOK_DISABLE: u32 = 1 << 31;

const CATEGORIES: [(u32, &str); 7] = [
    (HOOK_LL, "low-level"),
    (HOOK_ENUM, "enumeration"),
    (HOOK_CREATE, "creation"),
    (HOOK_PIDVID, "pidvid"),
    (HOOK_NAME, "name"),
    (HOOK_PROBE, "probe"),
    (HOOK_TRUST, "trust"),
];

/// Opaque interception capability. The manager drives it as: one
/// `initialize`, then `register` per active category (each stages the
/// redirections for that category), then a single all-or-nothing `commit`.
/// `teardown` restores everything and must tolerate being called with
/// nothing staged.
pub trait HookBackend: Send {
    fn initialize(&mut self) -> Result<()>;
    fn register(&mut self, category: u32) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn teardown(&mut self);
}

/// Per-slot identity the interception categories match against.
#[derive(Debug, Clone)]
pub struct HookDevice {
    pub user_index: usize,
    pub product_id: u32,
    pub instance_id: Option<String>,
    pub vid: u16,
    pub pid: u16,
    pub enabled: bool,
}

struct HookState {
    mask: u32,
    fake_pidvid: u32,
    timeout: Duration,
    devices: Vec<HookDevice>,
    backend: Option<Box<dyn HookBackend>>,
    installed: Vec<u32>,
    watchdog_cancel: Option<Arc<AtomicBool>>,
    watchdog_handle: Option<std::thread::JoinHandle<()>>,
}

fn mask_active(mask: u32, flag: u32) -> bool {
    if mask & HOOK_DISABLE != 0 || mask == HOOK_NONE {
        return false;
    }
    mask & flag == flag
}

/// Reverse every installed redirection, drop the slot table, clear the mask
/// and signal the watchdog. Safe to run any number of times; the second run
/// finds nothing to release.
fn uninstall_locked(st: &mut HookState) {
    if let Some(cancel) = st.watchdog_cancel.take() {
        cancel.store(true, Ordering::SeqCst);
    }
    if let Some(mut backend) = st.backend.take() {
        log::info!("Removing all hooks");
        backend.teardown();
    }
    st.installed.clear();
    st.devices.clear();
    st.mask = HOOK_NONE;
}

/// Owns the interception lifecycle: the category mask, the per-slot device
/// table, the installed backend and the recovery watchdog.
pub struct HookManager {
    state: Arc<Mutex<HookState>>,
}

impl HookManager {
    pub fn new(config: &HookConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HookState {
                mask: config.mask(),
                fake_pidvid: config.fake_pidvid,
                timeout: Duration::from_secs(config.timeout_secs),
                devices: Vec::new(),
                backend: None,
                installed: Vec::new(),
                watchdog_cancel: None,
                watchdog_handle: None,
            })),
        }
    }

    pub fn mask(&self) -> u32 {
        self.state.lock().unwrap().mask
    }

    pub fn set_mask(&self, mask: u32) {
        self.state.lock().unwrap().mask = mask;
    }

    pub fn enable(&self) {
        let mut st = self.state.lock().unwrap();
        st.mask &= !HOOK_DISABLE;
    }

    pub fn disable(&self) {
        let mut st = self.state.lock().unwrap();
        st.mask |= HOOK_DISABLE;
    }

    /// False when globally disabled or no category is selected; otherwise
    /// true iff every bit of `flag` is set.
    pub fn is_active(&self, flag: u32) -> bool {
        mask_active(self.state.lock().unwrap().mask, flag)
    }

    pub fn fake_pidvid(&self) -> u32 {
        self.state.lock().unwrap().fake_pidvid
    }

    /// Categories whose registration succeeded, for diagnostics.
    pub fn installed_categories(&self) -> Vec<u32> {
        self.state.lock().unwrap().installed.clone()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().unwrap().timeout = timeout;
    }

    /// Build the per-slot device table from the session profiles.
    pub fn bind_slots(&self, profiles: &[MappingProfile; USER_MAX_COUNT]) {
        let mut st = self.state.lock().unwrap();
        st.devices = profiles
            .iter()
            .enumerate()
            .map(|(user_index, profile)| HookDevice {
                user_index,
                product_id: profile.pidvid,
                instance_id: profile.instance_id.clone(),
                vid: profile.effective_vid(),
                pid: profile.effective_pid(),
                enabled: profile.mode != crate::config::SlotMode::Disabled,
            })
            .collect();
    }

    /// Install every active interception category through `backend`.
    ///
    /// Slots without a stable identity are force-disabled rather than
    /// failing the whole installation. A category whose registration fails
    /// is logged and stays inactive for the rest of the session. After the
    /// atomic commit the watchdog is armed unless suppressed.
    pub fn install_all(&self, mut backend: Box<dyn HookBackend>) -> Result<()> {
        let mut st = self.state.lock().unwrap();

        if !mask_active(st.mask, HOOK_NONE) {
            st.devices.clear();
            return Ok(());
        }

        for device in &mut st.devices {
            if device.product_id == 0 && device.instance_id.is_none() {
                log::warn!(
                    "Gamepad {} has no product or instance identity, disabling",
                    device.user_index + 1
                );
                device.enabled = false;
            }
        }

        log::info!("Hook engine starting with mask 0x{:08X}", st.mask);
        backend.initialize()?;

        for (flag, name) in CATEGORIES {
            if mask_active(st.mask, flag) {
                match backend.register(flag) {
                    Ok(()) => st.installed.push(flag),
                    Err(e) => {
                        log::warn!("Hook category {name} failed to install: {e}");
                        st.mask &= !flag;
                    }
                }
            }
        }

        if let Err(e) = backend.commit() {
            log::error!("Hook commit failed: {e}");
            backend.teardown();
            st.installed.clear();
            return Err(e);
        }
        st.backend = Some(backend);

        if st.timeout > Duration::ZERO && !mask_active(st.mask, HOOK_NOTIMEOUT) {
            self.arm_watchdog(&mut st);
        }
        Ok(())
    }

    /// Recovery path for hosts that never get past startup probing: after
    /// the timeout, force-uninstall everything unconditionally. A timer that
    /// fires after an explicit uninstall finds nothing installed.
    fn arm_watchdog(&self, st: &mut HookState) {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = cancel.clone();
        let state = Arc::clone(&self.state);
        let timeout = st.timeout;

        let handle = std::thread::Builder::new()
            .name("padshim-hook-watchdog".into())
            .spawn(move || {
                log::info!("Waiting {:?} for hooks...", timeout);
                let deadline = Instant::now() + timeout;
                while Instant::now() < deadline {
                    if thread_cancel.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                if thread_cancel.load(Ordering::SeqCst) {
                    return;
                }
                log::warn!("Hook timeout");
                let mut st = state.lock().unwrap();
                uninstall_locked(&mut st);
            })
            .expect("Failed to spawn hook watchdog thread");

        st.watchdog_cancel = Some(cancel);
        st.watchdog_handle = Some(handle);
    }

    /// Reverse everything and cancel the watchdog. Idempotent.
    pub fn uninstall_all(&self) {
        let handle = {
            let mut st = self.state.lock().unwrap();
            let handle = st.watchdog_handle.take();
            uninstall_locked(&mut st);
            handle
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Uninstall without joining the watchdog thread. For process-detach
    /// paths where joining a thread would deadlock on the loader lock.
    pub fn uninstall_no_join(&self) {
        let mut st = self.state.lock().unwrap();
        let _ = st.watchdog_handle.take();
        uninstall_locked(&mut st);
    }
}
