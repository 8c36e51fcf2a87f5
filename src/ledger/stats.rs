//! Statistics over the ledgers
//!
//! This module summarizes the completion and skip ledgers for the `stats`
//! command and flags records that point at the same URL or storage key.

use super::{DocumentRole, SkipLedger, TrackingStore};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Ledger statistics summary
#[derive(Debug, Clone, Default)]
pub struct LedgerStatistics {
    /// Structured completion records
    pub total_completed: u64,

    /// Keys known complete without metadata
    pub legacy_keys: u64,

    /// Entries kept as written because they could not be read as records
    pub retained: u64,

    pub completed_by_role: HashMap<DocumentRole, u64>,
    pub completed_by_day: BTreeMap<NaiveDate, u64>,

    pub first_completed: Option<DateTime<Utc>>,
    pub last_completed: Option<DateTime<Utc>>,

    /// Records sharing a URL with an earlier record
    pub duplicate_urls: u64,

    /// Records sharing a storage key with an earlier record
    pub duplicate_storage_keys: u64,

    pub skipped: u64,
}

/// Computes statistics from loaded ledgers
///
/// # Arguments
///
/// * `tracking` - The completion ledger
/// * `skipped` - The skip ledger
pub fn load_statistics(tracking: &TrackingStore, skipped: &SkipLedger) -> LedgerStatistics {
    let mut stats = LedgerStatistics {
        total_completed: tracking.documents().len() as u64,
        legacy_keys: tracking.legacy_keys().len() as u64,
        retained: tracking.retained().len() as u64,
        skipped: skipped.len() as u64,
        ..Default::default()
    };

    let mut urls = HashSet::new();
    let mut storage_keys = HashSet::new();

    for doc in tracking.documents() {
        *stats.completed_by_role.entry(doc.role).or_insert(0) += 1;
        *stats
            .completed_by_day
            .entry(doc.completed_at.date_naive())
            .or_insert(0) += 1;

        stats.first_completed = Some(match stats.first_completed {
            Some(first) => first.min(doc.completed_at),
            None => doc.completed_at,
        });
        stats.last_completed = Some(match stats.last_completed {
            Some(last) => last.max(doc.completed_at),
            None => doc.completed_at,
        });

        if !urls.insert(doc.url.as_str()) {
            stats.duplicate_urls += 1;
        }
        if !storage_keys.insert(doc.storage_key.as_str()) {
            stats.duplicate_storage_keys += 1;
        }
    }

    stats
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    println!("Overview:");
    println!("  Completed documents: {}", stats.total_completed);
    println!("  Legacy keys (no metadata): {}", stats.legacy_keys);
    if stats.retained > 0 {
        println!("  Unreadable entries kept as written: {}", stats.retained);
    }
    println!("  Skipped (not in force): {}", stats.skipped);
    match (stats.first_completed, stats.last_completed) {
        (Some(first), Some(last)) => {
            println!("  First completion: {}", first.format("%Y-%m-%d %H:%M:%S"));
            println!("  Last completion: {}", last.format("%Y-%m-%d %H:%M:%S"));
        }
        _ => println!("  No completions recorded yet"),
    }
    println!();

    if !stats.completed_by_role.is_empty() {
        println!("Completed by Role:");
        let mut role_counts: Vec<_> = stats.completed_by_role.iter().collect();
        role_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (role, count) in role_counts {
            let percentage = if stats.total_completed > 0 {
                (*count as f64 / stats.total_completed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", role, count, percentage);
        }
        println!();
    }

    if !stats.completed_by_day.is_empty() {
        println!("Completed by Day:");
        for (day, count) in &stats.completed_by_day {
            println!("  {}: {}", day, count);
        }
        println!();
    }

    if stats.duplicate_urls > 0 || stats.duplicate_storage_keys > 0 {
        println!("Potential Issues:");
        if stats.duplicate_urls > 0 {
            println!("  Duplicate URLs: {}", stats.duplicate_urls);
        }
        if stats.duplicate_storage_keys > 0 {
            println!("  Duplicate storage keys: {}", stats.duplicate_storage_keys);
        }
        println!();
    }
}
