use crate::config::{AnalogKind, MappingProfile, TriggerKind};
use crate::device::{
    RawSample, XInputGamepad, BUTTON_DPAD_DOWN, BUTTON_DPAD_LEFT, BUTTON_DPAD_RIGHT,
    BUTTON_DPAD_UP, BUTTON_LEFT_THUMB, BUTTON_ORDER, BUTTON_RIGHT_THUMB, POV_NEUTRAL,
};

/// Rescale `value` so the dead region above `lo_out` collapses to `lo_out`,
/// anything at or past `hi_in` saturates to `hi_out`, and the region in
/// between stretches linearly over the full output range. Monotonic
/// non-decreasing in `value`.
pub fn deadzone(value: i32, lo_out: i32, hi_out: i32, dz: i32, hi_in: i32) -> i32 {
    if value <= lo_out + dz {
        return lo_out;
    }
    if value >= hi_in {
        return hi_out;
    }
    let span_in = hi_in - lo_out - dz;
    if span_in <= 0 {
        return hi_out;
    }
    lo_out + (value - lo_out - dz) * (hi_out - lo_out) / span_in
}

/// Read a bank channel by the 1-based signed index convention: a positive
/// index reads `bank[index - 1]`; a negative index reads `bank[-index - 1]`
/// inverted (`-v - 1`, so the signed 16-bit range maps onto itself).
/// Index 0 and out-of-range indices read as 0.
fn read_channel(bank: &[i32], index: i8) -> i32 {
    if index > 0 {
        bank.get(index as usize - 1).copied().unwrap_or(0)
    } else if index < 0 {
        -bank.get((-(index as i32)) as usize - 1).copied().unwrap_or(0) - 1
    } else {
        0
    }
}

/// Directional bits for a rotary heading in centi-degrees.
///
/// Four overlapping half-circle windows, exclusive at their bounds so
/// cardinal headings light exactly one bit and corners exactly two.
/// The neutral sentinel and an exact 0 heading both read as "up".
fn dpad_bits(pov: u32) -> u16 {
    if pov == POV_NEUTRAL {
        return BUTTON_DPAD_UP;
    }
    let deg = (pov / 100) % 360;
    if deg == 0 {
        return BUTTON_DPAD_UP;
    }
    let mut bits = 0;
    if deg > 270 || deg < 90 {
        bits |= BUTTON_DPAD_UP;
    }
    if deg < 180 {
        bits |= BUTTON_DPAD_RIGHT;
    }
    if deg > 90 && deg < 270 {
        bits |= BUTTON_DPAD_DOWN;
    }
    if deg > 180 {
        bits |= BUTTON_DPAD_LEFT;
    }
    bits
}

fn trigger_value(sample: &RawSample, profile: &MappingProfile, index: usize) -> u8 {
    let map = profile.trigger_map[index];
    match map.kind {
        TriggerKind::Digital => {
            if map.source >= 0 && sample.button(map.source as u8) {
                255
            } else {
                0
            }
        }
        kind => {
            let bank: &[i32] = match kind {
                TriggerKind::Axis | TriggerKind::HalfAxis => &sample.axes,
                _ => &sample.sliders,
            };
            let value = read_channel(bank, map.source);
            // Full range projects -32768..32767 onto 0..255; half range
            // projects 0..32767.
            let (offset, scaling) = match kind {
                TriggerKind::Axis | TriggerKind::Slider => (32768, 256),
                _ => (0, 128),
            };
            let normalized = (value + offset) / scaling;
            deadzone(normalized, 0, 255, profile.trigger_deadzone, 255).clamp(0, 255) as u8
        }
    }
}

fn stick_value(sample: &RawSample, profile: &MappingProfile, index: usize) -> i16 {
    let map = profile.axis_map[index];
    let mut out: i16 = 0;

    if map.kind != AnalogKind::None && map.source != 0 {
        let bank: &[i32] = match map.kind {
            AnalogKind::Slider => &sample.sliders,
            _ => &sample.axes,
        };
        if map.source > 0 {
            let value = bank.get(map.source as usize - 1).copied().unwrap_or(0);
            out = value.clamp(-32768, 32767) as i16;
        } else {
            // Inverted read: rescale asymmetrically so both extremes stay
            // inside the signed 16-bit range.
            let mut value = -bank
                .get((-(map.source as i32)) as usize - 1)
                .copied()
                .unwrap_or(0);
            if value > 0 {
                value = 32767 * value / 32768;
            } else {
                value = 32768 * value / 32767;
            }
            out = value.clamp(-32768, 32767) as i16;
        }
    }

    // Digital overrides are evaluated after the analog read and always win.
    if let Some(button) = map.button_positive {
        if sample.button(button) {
            out = 32767;
        }
    }
    if let Some(button) = map.button_negative {
        if sample.button(button) {
            out = -32768;
        }
    }
    out
}

/// Pure raw-sample to canonical-gamepad conversion. Reads only its two
/// arguments; the caller stamps the packet number.
pub fn translate(sample: &RawSample, profile: &MappingProfile) -> XInputGamepad {
    let mut pad = XInputGamepad::default();

    for (i, mapped) in profile.button_map.iter().enumerate() {
        if let Some(raw) = mapped {
            if sample.button(*raw) {
                pad.buttons |= BUTTON_ORDER[i];
            }
        }
    }

    if profile.dpad_source.is_some() {
        pad.buttons |= dpad_bits(sample.pov);
    }

    pad.left_trigger = trigger_value(sample, profile, 0);
    pad.right_trigger = trigger_value(sample, profile, 1);

    if !profile.axis_to_dpad {
        pad.thumb_lx = stick_value(sample, profile, 0);
        pad.thumb_ly = stick_value(sample, profile, 1);
        pad.thumb_rx = stick_value(sample, profile, 2);
        pad.thumb_ry = stick_value(sample, profile, 3);
    } else {
        // Alternate mode: the first two axes drive digital directions.
        // Horizontal deviation lands on the stick-click bits (positive X =
        // left click, negative X = right click), vertical on the d-pad.
        let dz = profile.axis_to_dpad_deadzone;
        let x = sample.axes[0] - profile.axis_to_dpad_offset;
        let y = sample.axes[1] - profile.axis_to_dpad_offset;
        if x > dz {
            pad.buttons |= BUTTON_LEFT_THUMB;
        }
        if x < -dz {
            pad.buttons |= BUTTON_RIGHT_THUMB;
        }
        if y < -dz {
            pad.buttons |= BUTTON_DPAD_UP;
        }
        if y > dz {
            pad.buttons |= BUTTON_DPAD_DOWN;
        }
    }

    pad
}
