//! Catalog and access statistics.
//!
//! Summarizes the local state: cache freshness, documents per author, and
//! the access log. Used by `shelf stats`; makes no network calls.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;

use crate::access_log::{compute_stats, AccessLog};
use crate::cache::CacheStore;
use crate::config::Config;

/// Per-author breakdown of the cached catalog.
struct AuthorStats {
    author: String,
    doc_count: usize,
    pinned: usize,
    total_bytes: u64,
}

/// Run the stats command: read local state and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let cache = CacheStore::new(&config.cache.path).load();
    let cache_size = std::fs::metadata(&config.cache.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Shelf: Catalog Stats");
    println!("=====================");
    println!();
    println!("  Cache:       {}", config.cache.path.display());
    println!("  Size:        {}", format_bytes(cache_size));

    let Some(cache) = cache else {
        println!("  Last sync:   never");
        println!();
        return Ok(());
    };

    let fresh = cache.is_fresh(Utc::now(), config.cache.max_age());
    println!(
        "  Last sync:   {}{}",
        format_ts_relative(cache.last_sync.timestamp()),
        if fresh { "" } else { " (stale)" }
    );
    println!();
    println!("  Documents:   {}", cache.documents.len());
    println!(
        "  Pinned:      {}",
        cache.documents.iter().filter(|d| d.pinned).count()
    );

    let mut by_author: BTreeMap<String, AuthorStats> = BTreeMap::new();
    for doc in &cache.documents {
        let name = if doc.author.is_empty() {
            doc.author_slug.clone()
        } else {
            doc.author.clone()
        };
        let stat = by_author.entry(name.clone()).or_insert(AuthorStats {
            author: name,
            doc_count: 0,
            pinned: 0,
            total_bytes: 0,
        });
        stat.doc_count += 1;
        if doc.pinned {
            stat.pinned += 1;
        }
        stat.total_bytes += doc.file_size.unwrap_or(0);
    }

    let mut author_stats: Vec<AuthorStats> = by_author.into_values().collect();
    author_stats.sort_by(|a, b| b.doc_count.cmp(&a.doc_count));

    if !author_stats.is_empty() {
        println!();
        println!("  By author:");
        println!(
            "  {:<32} {:>6} {:>7} {:>10}",
            "AUTHOR", "DOCS", "PINNED", "SIZE"
        );
        println!("  {}", "-".repeat(58));
        for s in &author_stats {
            println!(
                "  {:<32} {:>6} {:>7} {:>10}",
                s.author,
                s.doc_count,
                s.pinned,
                format_bytes(s.total_bytes)
            );
        }
    }

    let log = AccessLog::new(&config.access_log.path, config.access_log.capacity);
    let entries = log.load();
    if !entries.is_empty() {
        let stats = compute_stats(&entries, Utc::now());
        println!();
        println!("  Access log:  {} entries", stats.total_access);
        println!("  Devices:     {} ({} active)", stats.unique_devices, stats.active_devices);
        if let Some(last) = stats.last_access {
            println!("  Last access: {}", format_ts_relative(last.timestamp()));
        }
        for d in stats.documents.iter().take(10) {
            println!("    {:>4}  {}", d.views, d.document);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
