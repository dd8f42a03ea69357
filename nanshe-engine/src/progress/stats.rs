//! Study time and streak statistics.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::types::{ActivityLog, Capsule, Id};

/// Open sessions older than this are closed at `start + limit`.
pub const STALE_SESSION_MINUTES: i64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsBreakdown {
    pub by_domain: BTreeMap<String, i64>,
    pub by_area: BTreeMap<String, i64>,
    pub by_capsule: BTreeMap<Id, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub total_study_time_seconds: i64,
    pub current_streak_days: u32,
    pub total_sessions: usize,
    pub breakdown: StatsBreakdown,
}

/// Close the stale open sessions in place; returns the ones that changed
pub fn close_stale(logs: &mut [ActivityLog], now: DateTime<Utc>) -> Vec<ActivityLog> {
    let limit = Duration::minutes(STALE_SESSION_MINUTES);
    let mut closed = Vec::new();
    for log in logs.iter_mut() {
        if log.end_time.is_none() && now - log.start_time > limit {
            log.end_time = Some(log.start_time + limit);
            closed.push(log.clone());
        }
    }
    closed
}

/// Aggregate closed sessions. Sessions still open count toward
/// `total_sessions` and study days but not toward time.
pub fn aggregate(
    logs: &[ActivityLog],
    capsules: &HashMap<Id, Capsule>,
    last_login: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> UserStats {
    let mut stats = UserStats {
        total_sessions: logs.len(),
        ..Default::default()
    };
    for log in logs {
        let Some(end) = log.end_time else { continue };
        let seconds = (end - log.start_time).num_seconds().max(0);
        stats.total_study_time_seconds += seconds;
        let Some(capsule_id) = log.capsule_id else { continue };
        *stats.breakdown.by_capsule.entry(capsule_id).or_default() += seconds;
        let (domain, area) = capsules
            .get(&capsule_id)
            .map(|c| (c.domain.clone(), c.area.clone()))
            .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));
        *stats.breakdown.by_domain.entry(domain).or_default() += seconds;
        *stats.breakdown.by_area.entry(area).or_default() += seconds;
    }

    let mut days: BTreeSet<NaiveDate> = logs.iter().map(|l| l.start_time.date_naive()).collect();
    if let Some(login) = last_login {
        days.insert(login.date_naive());
    }
    stats.current_streak_days = current_streak(&days, now.date_naive());
    if stats.current_streak_days == 0 && last_login.is_some() {
        stats.current_streak_days = 1;
    }
    stats
}

/// Consecutive days ending today, or yesterday when today is empty
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let start = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };
    let mut streak = 0;
    let mut day = Some(start);
    while let Some(d) = day
        && days.contains(&d)
    {
        streak += 1;
        day = d.pred_opt();
    }
    streak
}
