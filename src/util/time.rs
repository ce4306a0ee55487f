//! Short durations for status output: rate-limit cooldowns and the age of
//! the last discovery cycle. Both are at most a few hours in practice, so
//! output stops at the largest two units.

use chrono::{DateTime, TimeDelta, Utc};

/// Time left until a cooldown ends, e.g. `in 4m 30s`; `now` once passed.
#[must_use]
pub fn format_countdown(until: DateTime<Utc>) -> String {
    countdown_at(until, Utc::now())
}

/// Age of a past event, e.g. `12s ago`. Future times read `just now`.
#[must_use]
pub fn format_relative_time(at: DateTime<Utc>) -> String {
    age_at(at, Utc::now())
}

fn countdown_at(until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let left = until - now;
    if left <= TimeDelta::zero() {
        "now".to_string()
    } else {
        format!("in {}", compact(left))
    }
}

fn age_at(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - at;
    if age < TimeDelta::seconds(1) {
        "just now".to_string()
    } else {
        format!("{} ago", compact(age))
    }
}

/// `1h 5m`, `4m 30s`, `45s`; whole days past 24h.
fn compact(delta: TimeDelta) -> String {
    let secs = delta.num_seconds();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m, s) {
        (h, _, _) if h >= 24 => format!("{}d", h / 24),
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, 0, _) => format!("{h}h"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn cooldown_countdown() {
        assert_eq!(countdown_at(at(270), at(0)), "in 4m 30s");
        assert_eq!(countdown_at(at(300), at(0)), "in 5m");
        assert_eq!(countdown_at(at(42), at(0)), "in 42s");
        assert_eq!(countdown_at(at(3900), at(0)), "in 1h 5m");
        assert_eq!(countdown_at(at(0), at(10)), "now");
    }

    #[test]
    fn discovery_age() {
        assert_eq!(age_at(at(0), at(12)), "12s ago");
        assert_eq!(age_at(at(0), at(7200)), "2h ago");
        assert_eq!(age_at(at(0), at(3 * 86_400)), "3d ago");
        assert_eq!(age_at(at(5), at(0)), "just now");
    }

    #[test]
    fn wall_clock_wrappers() {
        assert_eq!(format_countdown(Utc::now() - TimeDelta::minutes(1)), "now");
        assert_eq!(format_relative_time(Utc::now()), "just now");
    }
}
