// src/analytics/mod.rs
//! # Time-bucket analytics
//! Groups tagged log entries into calendar buckets (week / month / year)
//! anchored at a caller-supplied `now`.
//!
//! The trailing window is always fully present (8 weeks, 12 months,
//! 5 years) so charts get a continuous axis; entries outside it are dropped
//! from the bucket view but still show up in [`tag_totals`].
//! Weeks start on Sunday. All period math is done in UTC.

pub mod logs;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tags::in_scope;

pub use logs::{DocumentSearch, LogEntry, RawSearchItem, SearchResponse, TagLogLoader};

/// Period label → tag → count, ordered chronologically.
pub type Buckets = BTreeMap<String, BTreeMap<String, u32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Number of trailing periods pre-seeded.
    pub fn window(self) -> u32 {
        match self {
            Granularity::Week => 8,
            Granularity::Month => 12,
            Granularity::Year => 5,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Some(Granularity::Week),
            "month" | "monthly" => Some(Granularity::Month),
            "year" | "yearly" => Some(Granularity::Year),
            _ => None,
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn month_key(year: i32, month0: i32) -> String {
    // month0 may be out of 0..12 after shifting; normalize.
    let total = year * 12 + month0;
    format!("{:04}-{:02}", total.div_euclid(12), total.rem_euclid(12) + 1)
}

/// Canonical period label for a timestamp.
pub fn period_key(at: DateTime<Utc>, granularity: Granularity) -> String {
    let date = at.date_naive();
    match granularity {
        Granularity::Week => week_start(date).format("%Y-%m-%d").to_string(),
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Year => format!("{:04}", date.year()),
    }
}

/// The trailing window of period labels ending at `now`, oldest first.
pub fn seeded_keys(granularity: Granularity, now: DateTime<Utc>) -> Vec<String> {
    let date = now.date_naive();
    let n = granularity.window() as i32;
    (0..n)
        .rev()
        .map(|i| match granularity {
            Granularity::Week => (week_start(date) - Duration::weeks(i64::from(i)))
                .format("%Y-%m-%d")
                .to_string(),
            Granularity::Month => month_key(date.year(), date.month0() as i32 - i),
            Granularity::Year => format!("{:04}", date.year() - i),
        })
        .collect()
}

pub fn bucketize(entries: &[LogEntry], granularity: Granularity, now: DateTime<Utc>) -> Buckets {
    let mut buckets: Buckets = seeded_keys(granularity, now)
        .into_iter()
        .map(|k| (k, BTreeMap::new()))
        .collect();

    for entry in entries {
        let Some(at) = entry.date() else {
            continue;
        };
        let Some(bucket) = buckets.get_mut(&period_key(at, granularity)) else {
            continue;
        };
        for tag in &entry.tags {
            *bucket.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    buckets
}

/// Ungrouped tag counts, highest first, ties by name.
pub fn tag_totals(entries: &[LogEntry]) -> Vec<(String, u32)> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for entry in entries {
        for tag in &entry.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    let mut out: Vec<(String, u32)> = counts
        .into_iter()
        .map(|(t, c)| (t.to_string(), c))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Restrict bucket contents to selected tags (sub-paths included). An empty
/// selection means no filter.
pub fn filter_buckets(buckets: &Buckets, selected: &BTreeSet<String>) -> Buckets {
    if selected.is_empty() {
        return buckets.clone();
    }
    buckets
        .iter()
        .map(|(period, counts)| {
            let kept = counts
                .iter()
                .filter(|(tag, _)| selected.iter().any(|s| in_scope(tag, s)))
                .map(|(t, c)| (t.clone(), *c))
                .collect();
            (period.clone(), kept)
        })
        .collect()
}

pub fn bucket_total(counts: &BTreeMap<String, u32>) -> u32 {
    counts.values().sum()
}

/// Largest per-period total, never below 1.
pub fn max_bucket_total(buckets: &Buckets) -> u32 {
    buckets.values().map(bucket_total).max().unwrap_or(0).max(1)
}

/// Bar height as a fraction of the window maximum.
pub fn bar_fraction(total: u32, max: u32) -> f64 {
    f64::from(total) / f64::from(max.max(1))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartBar {
    pub period: String,
    pub total: u32,
    pub fraction: f64,
    pub tags: BTreeMap<String, u32>,
}

/// Chart-ready rows for one granularity, with an optional tag filter.
pub fn chart(
    entries: &[LogEntry],
    granularity: Granularity,
    selected: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Vec<ChartBar> {
    let buckets = filter_buckets(&bucketize(entries, granularity, now), selected);
    let max = max_bucket_total(&buckets);
    buckets
        .into_iter()
        .map(|(period, tags)| {
            let total = bucket_total(&tags);
            ChartBar {
                period,
                total,
                fraction: bar_fraction(total, max),
                tags,
            }
        })
        .collect()
}
