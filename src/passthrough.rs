//! Forwarding to the system XInput implementation, for slots configured as
//! native pass-through. The real library is resolved once, lazily, from the
//! system directory so the search never finds this shim again.

use crate::device::{
    Guid, XInputBatteryInformation, XInputCapabilities, XInputKeystroke, XInputState,
    XInputVibration,
};
use crate::error::{Result, ShimError};
use std::sync::OnceLock;

/// Resolved entry points of the system library. All seven documented
/// exports are required; a library missing any of them is rejected.
pub struct NativeXInput {
    pub get_state: unsafe extern "system" fn(u32, *mut XInputState) -> u32,
    pub set_state: unsafe extern "system" fn(u32, *mut XInputVibration) -> u32,
    pub get_capabilities: unsafe extern "system" fn(u32, u32, *mut XInputCapabilities) -> u32,
    pub enable: unsafe extern "system" fn(i32),
    pub get_dsound_audio_device_guids: unsafe extern "system" fn(u32, *mut Guid, *mut Guid) -> u32,
    pub get_battery_information:
        unsafe extern "system" fn(u32, u8, *mut XInputBatteryInformation) -> u32,
    pub get_keystroke: unsafe extern "system" fn(u32, u32, *mut XInputKeystroke) -> u32,
}

/// The system library handle stays loaded for the process lifetime, so the
/// resolved pointers are 'static.
pub fn native() -> Result<&'static NativeXInput> {
    static NATIVE: OnceLock<std::result::Result<NativeXInput, String>> = OnceLock::new();
    match NATIVE.get_or_init(resolve) {
        Ok(native) => Ok(native),
        Err(e) => Err(ShimError::NativeResolution(e.clone())),
    }
}

#[cfg(windows)]
fn resolve() -> std::result::Result<NativeXInput, String> {
    use windows::core::{PCSTR, PCWSTR};
    use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
    use windows::Win32::System::SystemInformation::GetSystemDirectoryW;

    let mut buf = [0u16; 260];
    let len = unsafe { GetSystemDirectoryW(Some(&mut buf)) } as usize;
    if len == 0 || len >= buf.len() {
        return Err("GetSystemDirectoryW failed".into());
    }

    let mut path: Vec<u16> = buf[..len].to_vec();
    path.extend("\\xinput1_3.dll".encode_utf16());
    path.push(0);

    let module = unsafe { LoadLibraryW(PCWSTR(path.as_ptr())) }
        .map_err(|e| format!("LoadLibraryW(xinput1_3.dll): {e}"))?;

    // Symbol names must be NUL-terminated byte strings for GetProcAddress.
    let symbol =
        |name: &'static [u8]| -> std::result::Result<unsafe extern "system" fn() -> isize, String> {
        unsafe { GetProcAddress(module, PCSTR(name.as_ptr())) }.ok_or_else(|| {
            format!(
                "xinput1_3.dll is missing {}",
                String::from_utf8_lossy(&name[..name.len() - 1])
            )
        })
    };

    unsafe {
        Ok(NativeXInput {
            get_state: std::mem::transmute(symbol(b"XInputGetState\0")?),
            set_state: std::mem::transmute(symbol(b"XInputSetState\0")?),
            get_capabilities: std::mem::transmute(symbol(b"XInputGetCapabilities\0")?),
            enable: std::mem::transmute(symbol(b"XInputEnable\0")?),
            get_dsound_audio_device_guids: std::mem::transmute(symbol(
                b"XInputGetDSoundAudioDeviceGuids\0",
            )?),
            get_battery_information: std::mem::transmute(symbol(b"XInputGetBatteryInformation\0")?),
            get_keystroke: std::mem::transmute(symbol(b"XInputGetKeystroke\0")?),
        })
    }
}

#[cfg(not(windows))]
fn resolve() -> std::result::Result<NativeXInput, String> {
    Err("native XInput is only available on Windows".into())
}
