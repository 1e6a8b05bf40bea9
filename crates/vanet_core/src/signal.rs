//! Discrete signal-quality model.
//!
//! A pure step function over distance and line-of-sight. No fading, no
//! randomness; level 0 means no link and level 2 is the weakest usable link.

/// Minimum signal level for a usable link.
pub const MIN_USABLE_SIGNAL: u8 = 2;

/// Signal quality 0..5 for a receiver `distance_m` metres away.
pub fn signal_quality(distance_m: u32, line_of_sight: bool) -> u8 {
    if line_of_sight {
        match distance_m {
            0..=69 => 5,
            70..=114 => 4,
            115..=134 => 3,
            135..=154 => 2,
            _ => 0,
        }
    } else {
        match distance_m {
            0..=57 => 5,
            58..=64 => 4,
            65..=104 => 3,
            105..=129 => 2,
            _ => 0,
        }
    }
}
