use crate::error::Result;
use std::sync::OnceLock;
use std::time::Instant;

pub const USER_MAX_COUNT: usize = 4;

// Win32 result codes the exports must return verbatim.
pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_BAD_ARGUMENTS: u32 = 160;
pub const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;

pub const BUTTON_DPAD_UP: u16 = 0x0001;
pub const BUTTON_DPAD_DOWN: u16 = 0x0002;
pub const BUTTON_DPAD_LEFT: u16 = 0x0004;
pub const BUTTON_DPAD_RIGHT: u16 = 0x0008;
pub const BUTTON_START: u16 = 0x0010;
pub const BUTTON_BACK: u16 = 0x0020;
pub const BUTTON_LEFT_THUMB: u16 = 0x0040;
pub const BUTTON_RIGHT_THUMB: u16 = 0x0080;
pub const BUTTON_LEFT_SHOULDER: u16 = 0x0100;
pub const BUTTON_RIGHT_SHOULDER: u16 = 0x0200;
pub const BUTTON_A: u16 = 0x1000;
pub const BUTTON_B: u16 = 0x2000;
pub const BUTTON_X: u16 = 0x4000;
pub const BUTTON_Y: u16 = 0x8000;

/// Canonical order of the ten mappable buttons. `MappingProfile::button_map[i]`
/// names the raw button that drives `BUTTON_ORDER[i]`.
pub const BUTTON_ORDER: [u16; 10] = [
    BUTTON_A,
    BUTTON_B,
    BUTTON_X,
    BUTTON_Y,
    BUTTON_LEFT_SHOULDER,
    BUTTON_RIGHT_SHOULDER,
    BUTTON_BACK,
    BUTTON_START,
    BUTTON_LEFT_THUMB,
    BUTTON_RIGHT_THUMB,
];

pub const BATTERY_TYPE_WIRED: u8 = 0x01;
pub const BATTERY_LEVEL_FULL: u8 = 0x03;

/// POV value reported when the rotary indicator is centered (no heading).
pub const POV_NEUTRAL: u32 = 0xFFFF_FFFF;

/// One polling instant of the underlying device, before any mapping.
///
/// Axis and slider values use the signed 16-bit device range. The seventh
/// axis slot is reserved and always zero.
#[derive(Clone, Copy, Debug)]
pub struct RawSample {
    pub axes: [i32; 7],
    pub sliders: [i32; 2],
    /// Rotary heading in centi-degrees (0..=35900), or `POV_NEUTRAL`.
    pub pov: u32,
    /// Raw button bitset, one bit per device button index.
    pub buttons: u32,
}

impl Default for RawSample {
    fn default() -> Self {
        Self {
            axes: [0; 7],
            sliders: [0; 2],
            pov: POV_NEUTRAL,
            buttons: 0,
        }
    }
}

impl RawSample {
    pub fn button(&self, index: u8) -> bool {
        index < 32 && self.buttons & (1 << index) != 0
    }
}

/// Mirror of XINPUT_GAMEPAD. Layout must match the impersonated library
/// bit-for-bit; games read this straight out of the exported call.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputGamepad {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// Mirror of XINPUT_STATE.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputState {
    pub packet_number: u32,
    pub gamepad: XInputGamepad,
}

/// Mirror of XINPUT_VIBRATION.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputVibration {
    pub left_motor_speed: u16,
    pub right_motor_speed: u16,
}

/// Mirror of XINPUT_CAPABILITIES.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputCapabilities {
    pub kind: u8,
    pub sub_type: u8,
    pub flags: u16,
    pub gamepad: XInputGamepad,
    pub vibration: XInputVibration,
}

/// Mirror of XINPUT_BATTERY_INFORMATION.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputBatteryInformation {
    pub battery_type: u8,
    pub battery_level: u8,
}

/// Mirror of XINPUT_KEYSTROKE.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XInputKeystroke {
    pub virtual_key: u16,
    pub unicode: u16,
    pub flags: u16,
    pub user_index: u8,
    pub hid_code: u8,
}

/// Binary layout of a Windows GUID, for the DirectSound device queries.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// An open handle to one underlying input device: polling plus the two
/// force-feedback motors.
pub trait RawDevice: Send {
    fn poll(&mut self) -> Result<RawSample>;

    /// Lazily create the device-side periodic effect for `motor` (0 = left,
    /// 1 = right). Absence of force capability is an expected failure.
    fn prepare_force(&mut self, motor: usize, direction: i32) -> Result<()>;

    fn set_force(&mut self, motor: usize, magnitude: u16) -> Result<()>;
}

/// Acquires raw devices for controller slots. Supplied by the host
/// integration; the shim itself does not talk to the input subsystem.
pub trait DeviceSource: Send {
    fn acquire(&mut self, slot: usize, vid: u16, pid: u16) -> Result<Box<dyn RawDevice>>;
}

/// Coarse monotonic tick used as the packet sequence number.
pub fn packet_tick() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sample_defaults_to_neutral_pov() {
        let sample = RawSample::default();
        assert_eq!(sample.pov, POV_NEUTRAL);
        assert!(!sample.button(0));
    }

    #[test]
    fn button_bitset_indexing() {
        let sample = RawSample {
            buttons: 1 << 3 | 1 << 9,
            ..Default::default()
        };
        assert!(sample.button(3));
        assert!(sample.button(9));
        assert!(!sample.button(4));
        assert!(!sample.button(33));
    }

    #[test]
    fn gamepad_struct_matches_xinput_layout() {
        assert_eq!(std::mem::size_of::<XInputGamepad>(), 12);
        assert_eq!(std::mem::size_of::<XInputState>(), 16);
        assert_eq!(std::mem::size_of::<XInputVibration>(), 4);
        assert_eq!(std::mem::size_of::<XInputCapabilities>(), 20);
    }

    #[test]
    fn packet_tick_is_monotonic() {
        let a = packet_tick();
        let b = packet_tick();
        assert!(b >= a);
    }
}
