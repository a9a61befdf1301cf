//! Ambient idle delay
//!
//! How long Chazy stays quiet before saying something unprompted:
//!
//! ```text
//! delay = base_idle(emotion)
//!       × damped_autonomy(autonomy)     (75 % of the raw effect)
//!       × length_multiplier(last_len)   (0.8× to 1.8×)
//!       + reflect_pull × 2 s
//! floored by the longest theme minimum, clamped to [3 s, 30 s]
//! ```

use std::time::Duration;

use crate::emotion::{Emotion, Theme};

/// Shortest ambient delay
pub const MIN_AMBIENT_MS: f64 = 3000.0;

/// Longest ambient delay
pub const MAX_AMBIENT_MS: f64 = 30000.0;

/// Share of the raw autonomy effect that is applied
const AUTONOMY_DAMPING: f64 = 0.75;

/// Line length at which the length multiplier saturates
const LENGTH_SATURATION: f64 = 200.0;

/// Extra delay per unit of reflect pull
const REFLECT_PULL_MS: f64 = 2000.0;

/// Idle time before an ambient line for each emotion
#[must_use]
pub fn base_idle_ms(emotion: Emotion) -> f64 {
    match emotion {
        Emotion::Neutral => 8000.0,
        Emotion::Bored => 14000.0,
        Emotion::Excited => 5000.0,
        Emotion::Concerned => 9000.0,
        Emotion::Surprised => 6000.0,
        Emotion::Amused => 7000.0,
        Emotion::Analytical => 10000.0,
        Emotion::Contemplative => 15000.0,
        Emotion::Curious => 7000.0,
    }
}

/// Autonomy multiplier: more autonomous minds speak sooner
#[must_use]
pub fn autonomy_multiplier(autonomy: f64) -> f64 {
    let raw = 1.5 - autonomy.clamp(0.0, 1.0);
    1.0 + (raw - 1.0) * AUTONOMY_DAMPING
}

/// Longer last lines earn a longer pause
#[must_use]
pub fn length_multiplier(last_len: usize) -> f64 {
    0.8 + (last_len as f64).min(LENGTH_SATURATION) / LENGTH_SATURATION
}

/// Delay before the next ambient cycle
#[must_use]
pub fn ambient_delay(
    emotion: Emotion,
    autonomy: f64,
    last_len: usize,
    themes: &[Theme],
    reflect_pull: f64,
) -> Duration {
    let ms = base_idle_ms(emotion) * autonomy_multiplier(autonomy) * length_multiplier(last_len)
        + reflect_pull.clamp(0.0, 1.0) * REFLECT_PULL_MS;
    let floor = themes
        .iter()
        .map(|theme| theme.minimum_idle_ms() as f64)
        .fold(MIN_AMBIENT_MS, f64::max);
    let ms = ms.max(floor).clamp(MIN_AMBIENT_MS, MAX_AMBIENT_MS);
    Duration::from_secs_f64(ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autonomy_is_damped() {
        assert!((autonomy_multiplier(0.5) - 1.0).abs() < 1e-9);
        assert!((autonomy_multiplier(1.0) - 0.625).abs() < 1e-9);
        assert!((autonomy_multiplier(0.0) - 1.375).abs() < 1e-9);
    }

    #[test]
    fn test_length_multiplier_range() {
        assert!((length_multiplier(0) - 0.8).abs() < 1e-9);
        assert!((length_multiplier(200) - 1.8).abs() < 1e-9);
        assert!((length_multiplier(10_000) - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_delay_is_clamped() {
        for emotion in Emotion::ALL {
            for autonomy in [0.0, 0.5, 1.0] {
                for len in [0, 50, 400] {
                    let delay = ambient_delay(emotion, autonomy, len, &[], 1.0);
                    assert!(delay >= Duration::from_secs(3));
                    assert!(delay <= Duration::from_secs(30));
                }
            }
        }
    }

    #[test]
    fn test_theme_floor() {
        let quick = ambient_delay(Emotion::Excited, 1.0, 0, &[], 0.0);
        assert_eq!(quick, Duration::from_secs(3));
        let heavy = ambient_delay(Emotion::Excited, 1.0, 0, &[Theme::Loss], 0.0);
        assert_eq!(heavy, Duration::from_secs(4));
    }

    #[test]
    fn test_contemplative_waits_longer() {
        let excited = ambient_delay(Emotion::Excited, 0.5, 40, &[], 0.0);
        let contemplative = ambient_delay(Emotion::Contemplative, 0.5, 40, &[], 0.0);
        assert!(contemplative > excited);
    }
}
