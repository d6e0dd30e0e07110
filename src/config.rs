use crate::device::USER_MAX_COUNT;
use crate::error::{Result, ShimError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the shim does with a controller slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SlotMode {
    /// Translate a raw device into canonical reports.
    #[default]
    Emulate,
    /// Forward every call to the genuine system library.
    NativePassthrough,
    /// Slot reports not-connected and an all-zero state.
    Disabled,
}

/// Analog source bank for a stick channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum AnalogKind {
    #[default]
    None,
    Axis,
    Slider,
}

/// How a trigger channel is fed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum TriggerKind {
    /// 255 while the mapped button is held, else 0.
    #[default]
    Digital,
    /// Full-range axis (-32768..32767 projected to 0..255).
    Axis,
    /// Half-range axis (0..32767 projected to 0..255).
    HalfAxis,
    Slider,
    HalfSlider,
}

/// Capability class reported to the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum GamepadSubtype {
    #[default]
    Gamepad,
    Wheel,
    ArcadeStick,
    FlightStick,
    DancePad,
    Guitar,
    DrumKit,
}

impl GamepadSubtype {
    pub fn as_u8(self) -> u8 {
        match self {
            GamepadSubtype::Gamepad => 0x01,
            GamepadSubtype::Wheel => 0x02,
            GamepadSubtype::ArcadeStick => 0x03,
            GamepadSubtype::FlightStick => 0x04,
            GamepadSubtype::DancePad => 0x05,
            GamepadSubtype::Guitar => 0x06,
            GamepadSubtype::DrumKit => 0x08,
        }
    }
}

/// One stick channel: an analog source plus an optional digital override
/// pair. `source` is 1-based into the selected bank; a negative value reads
/// the channel at `abs(source)` inverted. 0 means no analog source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AxisMap {
    pub source: i8,
    pub kind: AnalogKind,
    pub button_positive: Option<u8>,
    pub button_negative: Option<u8>,
}

/// One trigger channel. Same 1-based signed `source` convention; for
/// `Digital` the source names a raw button index instead, with a negative
/// value meaning unmapped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriggerMap {
    pub source: i8,
    pub kind: TriggerKind,
}

impl Default for TriggerMap {
    fn default() -> Self {
        Self {
            source: -1,
            kind: TriggerKind::Digital,
        }
    }
}

/// Immutable per-slot mapping description. Built at configuration load and
/// only read afterwards, so translation can run lock-free against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MappingProfile {
    pub mode: SlotMode,

    /// Raw button index feeding each canonical button, in
    /// `device::BUTTON_ORDER` order. `None` leaves the button unmapped.
    pub button_map: [Option<u8>; 10],
    /// Rotary-indicator channel that drives the d-pad, if any.
    pub dpad_source: Option<u8>,
    pub axis_map: [AxisMap; 4],
    pub trigger_map: [TriggerMap; 2],

    pub trigger_deadzone: i32,
    /// Selects the alternate axis-to-dpad mode for this slot.
    pub axis_to_dpad: bool,
    pub axis_to_dpad_deadzone: i32,
    pub axis_to_dpad_offset: i32,

    pub use_force: bool,
    /// 0.0..=1.0 scale applied to requested motor speeds.
    pub force_percent: f32,
    pub swap_motors: bool,
    pub motor_direction: [i32; 2],

    pub sub_type: GamepadSubtype,

    /// Product identity dword: vendor id in the low word, product id in the
    /// high word. Used for acquisition and pid/vid spoofing.
    pub pidvid: u32,
    /// Explicit overrides; 0 falls back to the words of `pidvid`.
    pub vid: u16,
    pub pid: u16,
    pub instance_id: Option<String>,
}

impl Default for MappingProfile {
    fn default() -> Self {
        Self {
            mode: SlotMode::Disabled,
            button_map: [None; 10],
            dpad_source: None,
            axis_map: [AxisMap::default(); 4],
            trigger_map: [TriggerMap::default(); 2],
            trigger_deadzone: 0,
            axis_to_dpad: false,
            axis_to_dpad_deadzone: 0,
            axis_to_dpad_offset: 0,
            use_force: false,
            force_percent: 1.0,
            swap_motors: false,
            motor_direction: [0, 0],
            sub_type: GamepadSubtype::Gamepad,
            pidvid: 0,
            vid: 0,
            pid: 0,
            instance_id: None,
        }
    }
}

impl MappingProfile {
    pub fn effective_vid(&self) -> u16 {
        if self.vid != 0 {
            self.vid
        } else {
            (self.pidvid & 0xFFFF) as u16
        }
    }

    pub fn effective_pid(&self) -> u16 {
        if self.pid != 0 {
            self.pid
        } else {
            (self.pidvid >> 16) as u16
        }
    }

    /// A slot with neither a product nor an instance identity cannot be
    /// matched against the real device and gets force-disabled at hook
    /// install time.
    pub fn has_identity(&self) -> bool {
        self.pidvid != 0 || self.instance_id.is_some()
    }
}

/// Interception categories and watchdog tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookConfig {
    pub enabled: bool,
    pub low_level: bool,
    pub enumeration: bool,
    pub creation: bool,
    pub spoof_pidvid: bool,
    pub spoof_name: bool,
    pub system_probe: bool,
    pub trust_check: bool,
    pub no_watchdog: bool,
    /// Watchdog timeout in seconds; 0 disables the watchdog.
    pub timeout_secs: u64,
    /// Identity reported by the pid/vid spoof category.
    pub fake_pidvid: u32,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            low_level: false,
            enumeration: false,
            creation: false,
            spoof_pidvid: false,
            spoof_name: false,
            system_probe: false,
            trust_check: false,
            no_watchdog: false,
            timeout_secs: 30,
            // Reference wired pad: VID 0x045E, PID 0x028E.
            fake_pidvid: 0x028E_045E,
        }
    }
}

impl HookConfig {
    pub fn mask(&self) -> u32 {
        use crate::hooks::*;
        let mut mask = if self.enabled { HOOK_NONE } else { HOOK_DISABLE };
        if self.low_level {
            mask |= HOOK_LL;
        }
        if self.enumeration {
            mask |= HOOK_ENUM;
        }
        if self.creation {
            mask |= HOOK_CREATE;
        }
        if self.spoof_pidvid {
            mask |= HOOK_PIDVID;
        }
        if self.spoof_name {
            mask |= HOOK_NAME;
        }
        if self.system_probe {
            mask |= HOOK_PROBE;
        }
        if self.trust_check {
            mask |= HOOK_TRUST;
        }
        if self.no_watchdog {
            mask |= HOOK_NOTIMEOUT;
        }
        mask
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ShimConfig {
    pub hooks: HookConfig,
    pub profiles: [MappingProfile; USER_MAX_COUNT],
}

impl ShimConfig {
    fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ShimError::Config("Cannot find config directory".into()))?
            .join("padshim");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join("config.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_ids_derive_from_pidvid_words() {
        let profile = MappingProfile {
            pidvid: 0x028E_045E,
            ..Default::default()
        };
        assert_eq!(profile.effective_vid(), 0x045E);
        assert_eq!(profile.effective_pid(), 0x028E);
    }

    #[test]
    fn explicit_ids_win_over_pidvid() {
        let profile = MappingProfile {
            pidvid: 0x028E_045E,
            vid: 0x046D,
            pid: 0xC21D,
            ..Default::default()
        };
        assert_eq!(profile.effective_vid(), 0x046D);
        assert_eq!(profile.effective_pid(), 0xC21D);
    }

    #[test]
    fn hook_config_mask_round_trip() {
        let config = HookConfig {
            enabled: true,
            enumeration: true,
            creation: true,
            trust_check: true,
            ..Default::default()
        };
        let mask = config.mask();
        assert_eq!(
            mask,
            crate::hooks::HOOK_ENUM | crate::hooks::HOOK_CREATE | crate::hooks::HOOK_TRUST
        );

        let disabled = HookConfig::default().mask();
        assert_eq!(disabled, crate::hooks::HOOK_DISABLE);
    }

    #[test]
    fn config_serde_round_trip() {
        let mut config = ShimConfig::default();
        config.profiles[0].mode = SlotMode::Emulate;
        config.profiles[0].button_map[0] = Some(3);
        config.profiles[0].pidvid = 0x028E_045E;

        let json = serde_json::to_string(&config).unwrap();
        let back: ShimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
