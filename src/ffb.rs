use crate::config::MappingProfile;
use crate::device::{RawDevice, XInputVibration};

/// Motor magnitudes to issue for a vibration request: swap first if the
/// profile crosses the motors, then scale by `force_percent`.
pub fn motor_speeds(profile: &MappingProfile, vibration: &XInputVibration) -> (u16, u16) {
    let (left, right) = if profile.swap_motors {
        (vibration.right_motor_speed, vibration.left_motor_speed)
    } else {
        (vibration.left_motor_speed, vibration.right_motor_speed)
    };
    let scale = |v: u16| (v as f32 * profile.force_percent) as u16;
    (scale(left), scale(right))
}

/// Lazily create the device-side effect for each motor that does not have
/// one yet. Missing force capability is expected on plenty of hardware, so
/// failures are logged and the motor stays unprepared.
pub fn prepare(device: &mut dyn RawDevice, force_ready: &mut [bool; 2], profile: &MappingProfile) {
    for motor in 0..2 {
        if !force_ready[motor] {
            match device.prepare_force(motor, profile.motor_direction[motor]) {
                Ok(()) => force_ready[motor] = true,
                Err(e) => log::warn!("Force effect {motor} unavailable: {e}"),
            }
        }
    }
}

/// Drive both motors for a vibration request. A no-op when the profile has
/// force feedback off; per-motor failures never block the other motor and
/// never surface past this boundary.
pub fn apply(
    device: &mut dyn RawDevice,
    force_ready: &mut [bool; 2],
    profile: &MappingProfile,
    vibration: &XInputVibration,
) {
    if !profile.use_force {
        return;
    }
    prepare(device, force_ready, profile);
    let (left, right) = motor_speeds(profile, vibration);
    for (motor, magnitude) in [(0usize, left), (1usize, right)] {
        if force_ready[motor] {
            if let Err(e) = device.set_force(motor, magnitude) {
                log::warn!("Setting force on motor {motor} failed: {e}");
            }
        }
    }
}
