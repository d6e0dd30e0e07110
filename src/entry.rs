//! The emulator core: everything the exported ABI surface does, minus the
//! raw-pointer handling. Each operation takes a slot index plus out
//! parameters and returns a Win32 result code; no error ever escapes as
//! anything but a code.

use crate::config::{GamepadSubtype, ShimConfig, SlotMode};
use crate::device::{
    packet_tick, Guid, XInputBatteryInformation, XInputCapabilities, XInputGamepad, XInputKeystroke,
    XInputState, XInputVibration, BATTERY_LEVEL_FULL, BATTERY_TYPE_WIRED, ERROR_BAD_ARGUMENTS,
    ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS, USER_MAX_COUNT,
};
use crate::hooks::{HookBackend, HookManager};
use crate::registry::DeviceRegistry;
use crate::{ffb, passthrough, translate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Process-wide emulator session. One of these backs the whole exported
/// surface; construction happens on the first call into the library.
pub struct Emulator {
    registry: Mutex<DeviceRegistry>,
    hooks: HookManager,
    /// Current XInputEnable state; vendored input is zeroed while false.
    enabled: AtomicBool,
    /// Latched once the host calls XInputEnable at all. Hosts that never
    /// call it always receive live input.
    enable_tracking: AtomicBool,
    /// Whether any slot forwards to the system library, so XInputEnable
    /// knows to propagate.
    any_native: bool,
}

impl Emulator {
    pub fn new(config: ShimConfig, source: Box<dyn crate::device::DeviceSource>) -> Self {
        let hooks = HookManager::new(&config.hooks);
        hooks.bind_slots(&config.profiles);
        let any_native = config
            .profiles
            .iter()
            .any(|p| p.mode == SlotMode::NativePassthrough);
        Self {
            registry: Mutex::new(DeviceRegistry::new(config.profiles, source)),
            hooks,
            enabled: AtomicBool::new(true),
            enable_tracking: AtomicBool::new(false),
            any_native,
        }
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    /// Install the interception engine through `backend`, honoring the
    /// configured mask and slot bindings. A failed installation leaves the
    /// session running unhooked.
    pub fn install_hooks(&self, backend: Box<dyn HookBackend>) {
        if let Err(e) = self.hooks.install_all(backend) {
            log::error!("Hook installation failed: {e}");
        }
    }

    fn suppressed(&self) -> bool {
        self.enable_tracking.load(Ordering::SeqCst) && !self.enabled.load(Ordering::SeqCst)
    }

    pub fn get_state(&self, user_index: u32, state: &mut XInputState) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };
        *state = XInputState::default();

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => unsafe { (native.get_state)(user_index, state) },
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        // While input is suppressed the slot reports connected with a
        // neutral state and a frozen packet number; the device is never
        // touched, not even for a first acquisition.
        if self.suppressed() {
            return ERROR_SUCCESS;
        }

        let poll = match registry.resolve(index) {
            Ok(slot) => slot.device.as_mut().map(|d| d.poll()),
            Err(_) => return ERROR_DEVICE_NOT_CONNECTED,
        };
        let sample = match poll {
            Some(Ok(sample)) => sample,
            Some(Err(e)) => {
                // Poll failure means the device went away; drop the handle
                // so the next call re-acquires.
                log::warn!("Polling gamepad {} failed: {e}", index + 1);
                registry.drop_device(index);
                return ERROR_DEVICE_NOT_CONNECTED;
            }
            None => return ERROR_DEVICE_NOT_CONNECTED,
        };

        state.gamepad = translate::translate(&sample, registry.profile(index));
        state.packet_number = packet_tick();
        ERROR_SUCCESS
    }

    pub fn set_state(&self, user_index: u32, vibration: &XInputVibration) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => {
                        let mut v = *vibration;
                        unsafe { (native.set_state)(user_index, &mut v) }
                    }
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        // Suppressed input swallows vibration requests the same way it
        // freezes polling: success, no device work.
        if self.suppressed() {
            return ERROR_SUCCESS;
        }

        let slot = match registry.resolve(index) {
            Ok(slot) => slot,
            Err(_) => return ERROR_DEVICE_NOT_CONNECTED,
        };
        if let Some(device) = slot.device.as_mut() {
            ffb::apply(device.as_mut(), &mut slot.force_ready, &slot.profile, vibration);
        }
        ERROR_SUCCESS
    }

    pub fn get_capabilities(
        &self,
        user_index: u32,
        _flags: u32,
        capabilities: &mut XInputCapabilities,
    ) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => unsafe {
                        (native.get_capabilities)(user_index, _flags, capabilities)
                    },
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        if registry.resolve(index).is_err() {
            return ERROR_DEVICE_NOT_CONNECTED;
        }
        *capabilities = full_capabilities(registry.profile(index).sub_type);
        ERROR_SUCCESS
    }

    /// XInputEnable. The first call switches suppression tracking on for
    /// the rest of the session.
    pub fn enable(&self, enable: bool) {
        self.enable_tracking.store(true, Ordering::SeqCst);
        self.enabled.store(enable, Ordering::SeqCst);
        if self.any_native {
            match passthrough::native() {
                Ok(native) => unsafe { (native.enable)(enable as i32) },
                Err(e) => log::warn!("Native forwarding unavailable: {e}"),
            }
        }
    }

    pub fn get_keystroke(&self, user_index: u32, _flags: u32, keystroke: &mut XInputKeystroke) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };
        *keystroke = XInputKeystroke::default();

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => unsafe { (native.get_keystroke)(user_index, _flags, keystroke) },
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        if registry.resolve(index).is_err() {
            return ERROR_DEVICE_NOT_CONNECTED;
        }
        // Keystroke events are not synthesized from raw devices; a bound
        // slot reports success with an empty stroke.
        ERROR_SUCCESS
    }

    pub fn get_battery_information(
        &self,
        user_index: u32,
        _dev_type: u8,
        battery: &mut XInputBatteryInformation,
    ) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };
        *battery = XInputBatteryInformation::default();

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => unsafe {
                        (native.get_battery_information)(user_index, _dev_type, battery)
                    },
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        if registry.resolve(index).is_err() {
            return ERROR_DEVICE_NOT_CONNECTED;
        }
        battery.battery_type = BATTERY_TYPE_WIRED;
        battery.battery_level = BATTERY_LEVEL_FULL;
        ERROR_SUCCESS
    }

    pub fn get_dsound_audio_device_guids(
        &self,
        user_index: u32,
        render_guid: &mut Guid,
        capture_guid: &mut Guid,
    ) -> u32 {
        let Some(index) = check_index(user_index) else {
            return ERROR_BAD_ARGUMENTS;
        };
        *render_guid = Guid::default();
        *capture_guid = Guid::default();

        let mut registry = self.registry.lock().unwrap();
        match registry.profile(index).mode {
            SlotMode::NativePassthrough => {
                drop(registry);
                return match passthrough::native() {
                    Ok(native) => unsafe {
                        (native.get_dsound_audio_device_guids)(user_index, render_guid, capture_guid)
                    },
                    Err(e) => {
                        log::error!("Native forwarding unavailable: {e}");
                        ERROR_DEVICE_NOT_CONNECTED
                    }
                };
            }
            SlotMode::Disabled => return ERROR_DEVICE_NOT_CONNECTED,
            SlotMode::Emulate => {}
        }

        if registry.resolve(index).is_err() {
            return ERROR_DEVICE_NOT_CONNECTED;
        }
        // Emulated pads have no associated headset; null GUIDs and success.
        ERROR_SUCCESS
    }

    pub fn release_devices(&self) {
        self.registry.lock().unwrap().release_all();
    }
}

fn check_index(user_index: u32) -> Option<usize> {
    let index = user_index as usize;
    (index < USER_MAX_COUNT).then_some(index)
}

/// Fixed capability report for an emulated pad: every button and axis
/// present, both motors at full range. Matches what a wired reference pad
/// advertises so games enable their full feature set.
fn full_capabilities(sub_type: GamepadSubtype) -> XInputCapabilities {
    XInputCapabilities {
        kind: 0x00,
        sub_type: sub_type.as_u8(),
        flags: 0x0004,
        gamepad: XInputGamepad {
            buttons: 0xF3FF,
            left_trigger: 0xFF,
            right_trigger: 0xFF,
            thumb_lx: -64,
            thumb_ly: -64,
            thumb_rx: -64,
            thumb_ry: -64,
        },
        vibration: XInputVibration {
            left_motor_speed: 0x00FF,
            right_motor_speed: 0x00FF,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingProfile;
    use crate::device::{DeviceSource, RawDevice, RawSample};
    use crate::error::{Result, ShimError};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct ScriptedDevice {
        sample: Arc<Mutex<RawSample>>,
        polls: Arc<AtomicUsize>,
        fail_polls: Arc<AtomicBool>,
        forces: Arc<Mutex<Vec<(usize, u16)>>>,
    }

    impl RawDevice for ScriptedDevice {
        fn poll(&mut self) -> Result<RawSample> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail_polls.load(Ordering::SeqCst) {
                return Err(ShimError::Poll("unplugged".into()));
            }
            Ok(*self.sample.lock().unwrap())
        }

        fn prepare_force(&mut self, _motor: usize, _direction: i32) -> Result<()> {
            Ok(())
        }

        fn set_force(&mut self, motor: usize, magnitude: u16) -> Result<()> {
            self.forces.lock().unwrap().push((motor, magnitude));
            Ok(())
        }
    }

    struct ScriptedSource {
        sample: Arc<Mutex<RawSample>>,
        polls: Arc<AtomicUsize>,
        fail_polls: Arc<AtomicBool>,
        forces: Arc<Mutex<Vec<(usize, u16)>>>,
        acquisitions: Arc<AtomicUsize>,
    }

    impl DeviceSource for ScriptedSource {
        fn acquire(&mut self, _slot: usize, _vid: u16, _pid: u16) -> Result<Box<dyn RawDevice>> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedDevice {
                sample: self.sample.clone(),
                polls: self.polls.clone(),
                fail_polls: self.fail_polls.clone(),
                forces: self.forces.clone(),
            }))
        }
    }

    struct Rig {
        emulator: Emulator,
        sample: Arc<Mutex<RawSample>>,
        polls: Arc<AtomicUsize>,
        fail_polls: Arc<AtomicBool>,
        forces: Arc<Mutex<Vec<(usize, u16)>>>,
        acquisitions: Arc<AtomicUsize>,
    }

    fn rig(configure: impl FnOnce(&mut [MappingProfile; USER_MAX_COUNT])) -> Rig {
        let sample = Arc::new(Mutex::new(RawSample::default()));
        let polls = Arc::new(AtomicUsize::new(0));
        let fail_polls = Arc::new(AtomicBool::new(false));
        let forces = Arc::new(Mutex::new(Vec::new()));
        let acquisitions = Arc::new(AtomicUsize::new(0));

        let mut config = ShimConfig::default();
        configure(&mut config.profiles);

        let source = ScriptedSource {
            sample: sample.clone(),
            polls: polls.clone(),
            fail_polls: fail_polls.clone(),
            forces: forces.clone(),
            acquisitions: acquisitions.clone(),
        };
        Rig {
            emulator: Emulator::new(config, Box::new(source)),
            sample,
            polls,
            fail_polls,
            forces,
            acquisitions,
        }
    }

    fn emulated_profile(profile: &mut MappingProfile) {
        profile.mode = SlotMode::Emulate;
        profile.pidvid = 0x028E_045E;
        profile.button_map[0] = Some(0);
    }

    #[test]
    fn out_of_range_index_is_bad_arguments() {
        let rig = rig(|_| {});
        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(4, &mut state), ERROR_BAD_ARGUMENTS);
        assert_eq!(
            rig.emulator.set_state(17, &XInputVibration::default()),
            ERROR_BAD_ARGUMENTS
        );
    }

    #[test]
    fn disabled_slot_reports_not_connected_with_zeroed_state() {
        let rig = rig(|_| {});
        let mut state = XInputState {
            packet_number: 99,
            gamepad: XInputGamepad {
                buttons: 0xFFFF,
                ..Default::default()
            },
        };
        assert_eq!(
            rig.emulator.get_state(0, &mut state),
            ERROR_DEVICE_NOT_CONNECTED
        );
        assert_eq!(state, XInputState::default());
        assert_eq!(rig.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn emulated_slot_translates_a_pressed_button() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));
        rig.sample.lock().unwrap().buttons = 1;

        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(state.gamepad.buttons, crate::device::BUTTON_A);
        assert_eq!(rig.acquisitions.load(Ordering::SeqCst), 1);

        // The handle stays bound across calls.
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(rig.acquisitions.load(Ordering::SeqCst), 1);
        assert_eq!(rig.polls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn poll_failure_drops_the_handle_and_reacquires() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));
        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);

        rig.fail_polls.store(true, Ordering::SeqCst);
        assert_eq!(
            rig.emulator.get_state(0, &mut state),
            ERROR_DEVICE_NOT_CONNECTED
        );

        rig.fail_polls.store(false, Ordering::SeqCst);
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(rig.acquisitions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn suppressed_input_reports_neutral_without_polling() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));
        rig.sample.lock().unwrap().buttons = 1;

        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        let polls_before = rig.polls.load(Ordering::SeqCst);

        rig.emulator.enable(false);
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(state, XInputState::default());
        assert_eq!(rig.polls.load(Ordering::SeqCst), polls_before);

        rig.emulator.enable(true);
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(state.gamepad.buttons, crate::device::BUTTON_A);
    }

    #[test]
    fn suppression_succeeds_before_first_acquisition() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));

        // Disabling input before the first poll must not make the slot
        // look disconnected, and must not acquire anything.
        rig.emulator.enable(false);
        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);
        assert_eq!(state, XInputState::default());
        assert_eq!(rig.acquisitions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn suppressed_vibration_never_reaches_the_motors() {
        let rig = rig(|profiles| {
            emulated_profile(&mut profiles[0]);
            profiles[0].use_force = true;
        });
        let mut state = XInputState::default();
        assert_eq!(rig.emulator.get_state(0, &mut state), ERROR_SUCCESS);

        let vibration = XInputVibration {
            left_motor_speed: 40_000,
            right_motor_speed: 10_000,
        };
        rig.emulator.enable(false);
        assert_eq!(rig.emulator.set_state(0, &vibration), ERROR_SUCCESS);
        assert!(rig.forces.lock().unwrap().is_empty());

        rig.emulator.enable(true);
        assert_eq!(rig.emulator.set_state(0, &vibration), ERROR_SUCCESS);
        assert_eq!(
            &*rig.forces.lock().unwrap(),
            &[(0, 40_000), (1, 10_000)]
        );
    }

    #[test]
    fn registered_hook_backend_installs_at_session_start() {
        use crate::hooks::HookBackend;

        #[derive(Default)]
        struct InstallLog {
            initialized: AtomicUsize,
            registered: Mutex<Vec<u32>>,
        }

        struct LoggingBackend(Arc<InstallLog>);

        impl HookBackend for LoggingBackend {
            fn initialize(&mut self) -> Result<()> {
                self.0.initialized.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn register(&mut self, category: u32) -> Result<()> {
                self.0.registered.lock().unwrap().push(category);
                Ok(())
            }
            fn commit(&mut self) -> Result<()> {
                Ok(())
            }
            fn teardown(&mut self) {}
        }

        let mut config = ShimConfig::default();
        config.hooks.enabled = true;
        config.hooks.enumeration = true;
        config.hooks.no_watchdog = true;
        emulated_profile(&mut config.profiles[0]);

        let log = Arc::new(InstallLog::default());
        let emulator = Emulator::new(config, Box::new(crate::registry::DisconnectedSource));
        emulator.install_hooks(Box::new(LoggingBackend(log.clone())));

        assert_eq!(log.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(&*log.registered.lock().unwrap(), &[crate::hooks::HOOK_ENUM]);
        assert!(emulator.hooks().is_active(crate::hooks::HOOK_ENUM));

        emulator.hooks().uninstall_all();
    }

    #[test]
    fn capabilities_report_the_full_fixed_surface() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));
        let mut caps = XInputCapabilities::default();
        assert_eq!(rig.emulator.get_capabilities(0, 0, &mut caps), ERROR_SUCCESS);
        assert_eq!(caps.kind, 0x00);
        assert_eq!(caps.sub_type, 0x01);
        assert_eq!(caps.flags, 0x0004);
        assert_eq!(caps.gamepad.buttons, 0xF3FF);
        assert_eq!(caps.gamepad.left_trigger, 0xFF);
        assert_eq!(caps.gamepad.thumb_lx, -64);
        assert_eq!(caps.vibration.left_motor_speed, 0x00FF);
        assert_eq!(caps.vibration.right_motor_speed, 0x00FF);
    }

    #[test]
    fn battery_reports_wired_full_for_a_bound_slot() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));
        let mut battery = XInputBatteryInformation::default();
        assert_eq!(
            rig.emulator.get_battery_information(0, 0, &mut battery),
            ERROR_SUCCESS
        );
        assert_eq!(battery.battery_type, BATTERY_TYPE_WIRED);
        assert_eq!(battery.battery_level, BATTERY_LEVEL_FULL);

        assert_eq!(
            rig.emulator.get_battery_information(1, 0, &mut battery),
            ERROR_DEVICE_NOT_CONNECTED
        );
    }

    #[test]
    fn keystroke_and_dsound_follow_slot_binding() {
        let rig = rig(|profiles| emulated_profile(&mut profiles[0]));

        let mut keystroke = XInputKeystroke {
            virtual_key: 7,
            ..Default::default()
        };
        assert_eq!(rig.emulator.get_keystroke(0, 0, &mut keystroke), ERROR_SUCCESS);
        assert_eq!(keystroke, XInputKeystroke::default());

        let mut render = Guid {
            data1: 1,
            ..Default::default()
        };
        let mut capture = Guid::default();
        assert_eq!(
            rig.emulator.get_dsound_audio_device_guids(0, &mut render, &mut capture),
            ERROR_SUCCESS
        );
        assert_eq!(render, Guid::default());

        assert_eq!(
            rig.emulator.get_dsound_audio_device_guids(3, &mut render, &mut capture),
            ERROR_DEVICE_NOT_CONNECTED
        );
    }
}
