//! Progressive-delay bookkeeping for the friction path.
//!
//! Delayed domains are not blocked outright; each access costs a wait that
//! doubles with every prior access that day, capped at 160 seconds.
//! Passing the wait opens a 15-minute idle-rolling session window. The
//! per-day counter resets at local midnight.
//!
//! The interception proxy is the consumer of these decisions; the store
//! only keeps the arithmetic and the persisted sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Base wait for the first access of the day, in seconds.
const BASE_WAIT_SECS: u64 = 10;

/// Upper bound on the required wait, in seconds.
const MAX_WAIT_SECS: u64 = 160;

/// Length of the free-passage window after a passed delay, in minutes.
const SESSION_WINDOW_MINUTES: i64 = 15;

/// Per-domain delay-session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaySession {
    /// Canonical domain.
    pub domain: String,
    /// Accesses recorded today (local time).
    pub access_count_today: u32,
    /// Local date the counter was last reset.
    pub last_reset_date: NaiveDate,
    /// Instant of the most recent access.
    pub last_access_at: DateTime<Utc>,
}

/// The friction decision for one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayDecision {
    /// A previous wait was passed recently; passage is free until the
    /// window closes (each access rolls it forward).
    InSession {
        /// When the window closes absent further accesses.
        until: DateTime<Utc>,
    },
    /// The caller must wait this many seconds before passage.
    Wait {
        /// Required wait in seconds.
        seconds: u64,
    },
}

/// The required wait in seconds given the number of prior accesses today:
/// `min(10 * 2^n, 160)`.
#[must_use]
pub fn required_wait_secs(prior_accesses_today: u32) -> u64 {
    // 10 * 2^5 already exceeds the cap; avoid shifting into overflow.
    if prior_accesses_today >= 5 {
        return MAX_WAIT_SECS;
    }
    (BASE_WAIT_SECS << prior_accesses_today).min(MAX_WAIT_SECS)
}

fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// Computes the decision for `domain` at `now`.
#[must_use]
pub fn decision(
    sessions: &BTreeMap<String, DelaySession>,
    domain: &str,
    now: DateTime<Utc>,
) -> DelayDecision {
    let Some(session) = sessions.get(domain) else {
        return DelayDecision::Wait {
            seconds: required_wait_secs(0),
        };
    };

    let window_end = session.last_access_at + chrono::Duration::minutes(SESSION_WINDOW_MINUTES);
    if now < window_end {
        return DelayDecision::InSession { until: window_end };
    }

    let count_today = if session.last_reset_date == local_date(now) {
        session.access_count_today
    } else {
        0
    };
    DelayDecision::Wait {
        seconds: required_wait_secs(count_today),
    }
}

/// Records a completed wait for `domain`, resetting the counter on date
/// rollover and opening the session window.
pub fn record_access(
    sessions: &mut BTreeMap<String, DelaySession>,
    domain: &str,
    now: DateTime<Utc>,
) -> DelaySession {
    let today = local_date(now);
    let session = sessions
        .entry(domain.to_string())
        .and_modify(|s| {
            if s.last_reset_date != today {
                s.access_count_today = 0;
                s.last_reset_date = today;
            }
            s.access_count_today += 1;
            s.last_access_at = now;
        })
        .or_insert_with(|| DelaySession {
            domain: domain.to_string(),
            access_count_today: 1,
            last_reset_date: today,
            last_access_at: now,
        });
    session.clone()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn wait_doubles_and_caps() {
        assert_eq!(required_wait_secs(0), 10);
        assert_eq!(required_wait_secs(1), 20);
        assert_eq!(required_wait_secs(2), 40);
        assert_eq!(required_wait_secs(3), 80);
        assert_eq!(required_wait_secs(4), 160);
        assert_eq!(required_wait_secs(5), 160);
        assert_eq!(required_wait_secs(40), 160);
    }

    #[test]
    fn first_access_waits_base_then_opens_window() {
        let mut sessions = BTreeMap::new();
        let now = t0();

        assert_eq!(
            decision(&sessions, "news.ycombinator.com", now),
            DelayDecision::Wait { seconds: 10 }
        );

        record_access(&mut sessions, "news.ycombinator.com", now);
        match decision(&sessions, "news.ycombinator.com", now + Duration::minutes(5)) {
            DelayDecision::InSession { until } => {
                assert_eq!(until, now + Duration::minutes(15));
            },
            other => panic!("expected InSession, got {other:?}"),
        }
    }

    #[test]
    fn window_rolls_with_each_access() {
        let mut sessions = BTreeMap::new();
        let now = t0();
        record_access(&mut sessions, "reddit.com", now);
        let later = now + Duration::minutes(10);
        record_access(&mut sessions, "reddit.com", later);

        match decision(&sessions, "reddit.com", later + Duration::minutes(14)) {
            DelayDecision::InSession { until } => {
                assert_eq!(until, later + Duration::minutes(15));
            },
            other => panic!("expected InSession, got {other:?}"),
        }
    }

    #[test]
    fn second_visit_after_window_costs_double() {
        let mut sessions = BTreeMap::new();
        let now = t0();
        record_access(&mut sessions, "reddit.com", now);

        let after_window = now + Duration::minutes(16);
        assert_eq!(
            decision(&sessions, "reddit.com", after_window),
            DelayDecision::Wait { seconds: 20 }
        );
    }

    #[test]
    fn counter_resets_at_midnight() {
        let mut sessions = BTreeMap::new();
        let now = t0();
        for i in 0..4 {
            record_access(&mut sessions, "reddit.com", now + Duration::minutes(i * 20));
        }

        let tomorrow = now + Duration::days(1);
        assert_eq!(
            decision(&sessions, "reddit.com", tomorrow),
            DelayDecision::Wait { seconds: 10 }
        );

        let s = record_access(&mut sessions, "reddit.com", tomorrow);
        assert_eq!(s.access_count_today, 1);
    }
}
