//! The exported ABI surface. Raw pointers are validated here and nowhere
//! else; everything past this file works with references and result codes.

use crate::config::ShimConfig;
use crate::device::{
    DeviceSource, Guid, XInputBatteryInformation, XInputCapabilities, XInputKeystroke, XInputState,
    XInputVibration, ERROR_BAD_ARGUMENTS,
};
use crate::entry::Emulator;
use crate::hooks::HookBackend;
use crate::registry::DisconnectedSource;
use std::sync::{Mutex, OnceLock};

static EMULATOR: OnceLock<Emulator> = OnceLock::new();
static PENDING_SOURCE: Mutex<Option<Box<dyn DeviceSource>>> = Mutex::new(None);
static PENDING_BACKEND: Mutex<Option<Box<dyn HookBackend>>> = Mutex::new(None);

/// Register the device source the emulator will acquire raw devices from.
/// Must happen before the host's first call into the exported surface;
/// afterwards the session is already built and the registration is lost.
pub fn install_device_source(source: Box<dyn DeviceSource>) {
    *PENDING_SOURCE.lock().unwrap() = Some(source);
}

/// Register the interception backend. Same lifetime rule as
/// [`install_device_source`]: it takes effect only if registered before
/// the first exported call. Without one the session runs unhooked.
pub fn install_hook_backend(backend: Box<dyn HookBackend>) {
    *PENDING_BACKEND.lock().unwrap() = Some(backend);
}

fn emulator() -> &'static Emulator {
    EMULATOR.get_or_init(|| {
        crate::init_logging();
        let config = match ShimConfig::load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Could not load configuration, using defaults: {e}");
                ShimConfig::default()
            }
        };
        let source = PENDING_SOURCE
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| {
                log::warn!("No device source registered, all emulated slots stay disconnected");
                Box::new(DisconnectedSource)
            });
        log::info!("Shim session starting");
        let emulator = Emulator::new(config, source);
        if let Some(backend) = PENDING_BACKEND.lock().unwrap().take() {
            emulator.install_hooks(backend);
        }
        emulator
    })
}

const DLL_PROCESS_ATTACH: u32 = 1;
const DLL_PROCESS_DETACH: u32 = 0;

/// Library entry point. Attach work is deferred to the first exported
/// call; detach must not block on other threads while the loader lock is
/// held, so hooks are torn down without joining.
#[no_mangle]
pub extern "system" fn DllMain(_module: isize, reason: u32, _reserved: *mut core::ffi::c_void) -> i32 {
    match reason {
        DLL_PROCESS_ATTACH => {}
        DLL_PROCESS_DETACH => {
            if let Some(emulator) = EMULATOR.get() {
                emulator.hooks().uninstall_no_join();
                emulator.release_devices();
            }
        }
        _ => {}
    }
    1
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetState(user_index: u32, state: *mut XInputState) -> u32 {
    let Some(state) = state.as_mut() else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().get_state(user_index, state)
}

#[no_mangle]
pub unsafe extern "system" fn XInputSetState(
    user_index: u32,
    vibration: *mut XInputVibration,
) -> u32 {
    let Some(vibration) = vibration.as_ref() else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().set_state(user_index, vibration)
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetCapabilities(
    user_index: u32,
    flags: u32,
    capabilities: *mut XInputCapabilities,
) -> u32 {
    let Some(capabilities) = capabilities.as_mut() else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().get_capabilities(user_index, flags, capabilities)
}

#[no_mangle]
pub unsafe extern "system" fn XInputEnable(enable: i32) {
    emulator().enable(enable != 0);
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetDSoundAudioDeviceGuids(
    user_index: u32,
    render_guid: *mut Guid,
    capture_guid: *mut Guid,
) -> u32 {
    let (Some(render_guid), Some(capture_guid)) = (render_guid.as_mut(), capture_guid.as_mut())
    else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().get_dsound_audio_device_guids(user_index, render_guid, capture_guid)
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetBatteryInformation(
    user_index: u32,
    dev_type: u8,
    battery: *mut XInputBatteryInformation,
) -> u32 {
    let Some(battery) = battery.as_mut() else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().get_battery_information(user_index, dev_type, battery)
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetKeystroke(
    user_index: u32,
    flags: u32,
    keystroke: *mut XInputKeystroke,
) -> u32 {
    let Some(keystroke) = keystroke.as_mut() else {
        return ERROR_BAD_ARGUMENTS;
    };
    emulator().get_keystroke(user_index, flags, keystroke)
}
