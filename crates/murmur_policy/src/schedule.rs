//! Schedule simulator: diurnal sleep state and response-delay distribution.
//!
//! Local time is a fixed UTC offset's wall clock, with no daylight-saving
//! adjustment. The sleep window is hours 23 through 7 inclusive, so the awake
//! window is exactly hours 8-22.

use chrono::Timelike;
use rand::Rng;
use rand::RngCore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Time-of-day delay bands, first match wins. `(start_hour, end_hour, min_s, max_s)`;
/// a band wraps midnight when start > end. Bands deliberately overlap at the
/// edges so the distribution cannot be fingerprinted from transition hours.
const DELAY_BANDS: &[(u32, u32, f64, f64)] = &[
    (22, 8, 20.0, 90.0), // night: barely watching
    (7, 11, 5.0, 30.0),  // early morning: groggy
    (10, 19, 2.0, 12.0), // midday
    (17, 23, 1.0, 6.0),  // evening: most attentive
];

/// Applied when no band claims the hour.
const FALLBACK_DELAY: (f64, f64) = (3.0, 15.0);

/// Independent jitter added on top of the band draw, in seconds.
const JITTER_MAX_SECS: f64 = 2.0;

const MIN_DELAY_SECS: f64 = 0.5;

pub struct Schedule {
    utc_offset_hours: i32,
    force_awake: AtomicBool,
    /// Cached sleep flag, re-evaluated by the ambient loop.
    asleep: AtomicBool,
}

impl Schedule {
    pub fn new(utc_offset_hours: i32) -> Self {
        let schedule = Self {
            utc_offset_hours,
            force_awake: AtomicBool::new(false),
            asleep: AtomicBool::new(false),
        };
        schedule
            .asleep
            .store(schedule.should_be_asleep(), Ordering::Relaxed);
        schedule
    }

    /// Wall-clock hour at the configured fixed offset.
    pub fn local_hour(&self) -> u32 {
        self.local_hour_at(chrono::Utc::now().timestamp())
    }

    pub fn local_hour_at(&self, unix_secs: i64) -> u32 {
        let utc_hour = chrono::DateTime::from_timestamp(unix_secs, 0)
            .map(|dt| dt.hour() as i32)
            .unwrap_or(0);
        (utc_hour + self.utc_offset_hours).rem_euclid(24) as u32
    }

    pub fn should_be_asleep(&self) -> bool {
        self.should_be_asleep_at(chrono::Utc::now().timestamp())
    }

    pub fn should_be_asleep_at(&self, unix_secs: i64) -> bool {
        if self.force_awake.load(Ordering::Relaxed) {
            return false;
        }
        let hour = self.local_hour_at(unix_secs);
        hour >= 23 || hour <= 7
    }

    /// The cached flag the trigger evaluator reads between re-evaluations.
    pub fn is_asleep(&self) -> bool {
        self.asleep.load(Ordering::Relaxed)
    }

    /// Used by tests and the ambient loop to pin the cached flag directly.
    pub fn set_asleep(&self, asleep: bool) {
        self.asleep.store(asleep, Ordering::Relaxed);
    }

    /// Re-evaluate the cached flag; returns the new state on a transition.
    pub fn refresh(&self) -> Option<bool> {
        let next = self.should_be_asleep();
        let prev = self.asleep.swap(next, Ordering::Relaxed);
        (prev != next).then_some(next)
    }

    pub fn force_awake(&self) -> bool {
        self.force_awake.load(Ordering::Relaxed)
    }

    pub fn set_force_awake(&self, value: bool) {
        self.force_awake.store(value, Ordering::Relaxed);
    }

    /// Draw a humanized response delay for the current local hour.
    pub fn response_delay(&self, rng: &mut dyn RngCore) -> Duration {
        self.response_delay_at(self.local_hour(), rng)
    }

    pub fn response_delay_at(&self, hour: u32, rng: &mut dyn RngCore) -> Duration {
        let (min_s, max_s) = DELAY_BANDS
            .iter()
            .find(|(start, end, _, _)| hour_in_band(hour, *start, *end))
            .map(|(_, _, min_s, max_s)| (*min_s, *max_s))
            .unwrap_or(FALLBACK_DELAY);
        let base = rng.gen_range(min_s..max_s);
        let jitter = rng.gen_range(0.0..JITTER_MAX_SECS);
        Duration::from_secs_f64((base + jitter).max(MIN_DELAY_SECS))
    }
}

fn hour_in_band(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

// ============================================================================
// Tests
// ============================================================================
