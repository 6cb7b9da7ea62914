//! Persisted running totals shared by every surface.
//!
//! [`Stats`] is one record: how many optimizations succeeded, how many words
//! and grams of CO₂ they saved, when the installation started, and when the
//! last optimization landed. [`StatsStore`] is the only writer. Every update
//! is a serialized read-modify-write against the backend, never an
//! in-memory accumulator, so totals cannot drift from what is on disk.

pub mod backend;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use backend::{JsonFileBackend, MemoryBackend, STATS_KEY, StatsBackend};

use crate::client::OptimizationResult;
use crate::config::schema::StorageConfig;

pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize stats: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("timed out waiting for storage lock {}", .0.display())]
    LockTimeout(PathBuf),
    #[error("could not determine a storage location (no home directory)")]
    NoStorageLocation,
}

impl StatsError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The persisted stats record, stored under [`STATS_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "optimizations", default)]
    pub optimizations_count: u64,
    #[serde(rename = "tokensSaved", default)]
    pub cumulative_tokens_saved: u64,
    #[serde(rename = "co2Reduced", default)]
    pub cumulative_co2_reduced: f64,
    #[serde(rename = "installDate", default = "Utc::now")]
    pub install_date: DateTime<Utc>,
    #[serde(rename = "lastOptimization", default)]
    pub last_optimization_at: Option<DateTime<Utc>>,
}

impl Stats {
    /// Zeroed totals with the given install date.
    pub fn new(install_date: DateTime<Utc>) -> Self {
        Self {
            optimizations_count: 0,
            cumulative_tokens_saved: 0,
            cumulative_co2_reduced: 0.0,
            install_date,
            last_optimization_at: None,
        }
    }

    /// Fold one successful optimization into the totals.
    ///
    /// Negative or non-finite CO₂ deltas count as zero; totals only grow.
    pub fn apply(&mut self, tokens_saved: u64, co2_reduced: f64, at: DateTime<Utc>) {
        let co2 = if co2_reduced.is_finite() {
            co2_reduced.max(0.0)
        } else {
            0.0
        };
        self.optimizations_count = self.optimizations_count.saturating_add(1);
        self.cumulative_tokens_saved = self.cumulative_tokens_saved.saturating_add(tokens_saved);
        self.cumulative_co2_reduced += co2;
        self.last_optimization_at = Some(at);
    }

    /// Recover what can be read from a record that does not match the
    /// schema, field by field.
    ///
    /// Counters are kept when they are numbers or numeric strings; anything
    /// unreadable falls back to its zero value, so a salvaged record never
    /// holds less than the readable part of what was stored. A timestamp
    /// that cannot be parsed is replaced by `fallback_install_date`.
    pub fn salvage(value: &Value, fallback_install_date: DateTime<Utc>) -> Option<Self> {
        let record = value.as_object()?;
        let install_date = record
            .get("installDate")
            .and_then(parse_timestamp)
            .unwrap_or(fallback_install_date);

        Some(Self {
            optimizations_count: record.get("optimizations").and_then(read_count).unwrap_or(0),
            cumulative_tokens_saved: record.get("tokensSaved").and_then(read_count).unwrap_or(0),
            cumulative_co2_reduced: record
                .get("co2Reduced")
                .and_then(Value::as_f64)
                .filter(|grams| grams.is_finite() && *grams >= 0.0)
                .unwrap_or(0.0),
            install_date,
            last_optimization_at: record.get("lastOptimization").and_then(parse_timestamp),
        })
    }
}

fn read_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Typed access to the persisted [`Stats`] record.
#[derive(Clone)]
pub struct StatsStore {
    backend: Arc<dyn StatsBackend>,
}

impl std::fmt::Debug for StatsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsStore").finish_non_exhaustive()
    }
}

impl StatsStore {
    pub fn new(backend: Arc<dyn StatsBackend>) -> Self {
        Self { backend }
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    /// A store backed by the JSON document named in `[storage]`.
    pub fn from_config(config: &StorageConfig) -> StatsResult<Self> {
        let path = config
            .resolved_path()
            .ok_or(StatsError::NoStorageLocation)?;
        Ok(Self::new(Arc::new(JsonFileBackend::new(path))))
    }

    /// Current totals. The first load on a fresh installation persists a
    /// zeroed record so the install date stays fixed.
    pub fn load(&self) -> StatsResult<Stats> {
        if let Some(stats) = self.backend.load()? {
            return Ok(stats);
        }
        self.backend
            .update(&mut |current| current.unwrap_or_else(|| Stats::new(Utc::now())))
    }

    /// Record one successful optimization and return the updated snapshot.
    pub fn record_optimization(&self, result: &OptimizationResult) -> StatsResult<Stats> {
        self.record(result.tokens_saved(), result.co2_reduced_grams())
    }

    /// Record raw deltas. The read-modify-write runs under the backend's
    /// exclusive update, so concurrent recorders never lose an increment.
    pub fn record(&self, tokens_saved: u64, co2_reduced: f64) -> StatsResult<Stats> {
        let now = Utc::now();
        let stats = self.backend.update(&mut |current| {
            let mut stats = current.unwrap_or_else(|| Stats::new(now));
            stats.apply(tokens_saved, co2_reduced, now);
            stats
        })?;
        tracing::debug!(
            optimizations = stats.optimizations_count,
            tokens_saved = stats.cumulative_tokens_saved,
            co2_reduced = stats.cumulative_co2_reduced,
            "stats recorded"
        );
        Ok(stats)
    }

    /// Zero the totals and start a new install date.
    pub fn reset(&self) -> StatsResult<Stats> {
        let fresh = Stats::new(Utc::now());
        self.backend.save(&fresh)?;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_accumulates_and_stamps() {
        let start = Utc::now();
        let mut stats = Stats::new(start);
        stats.apply(5, 2.0, start);
        stats.apply(3, 0.5, start);
        assert_eq!(stats.optimizations_count, 2);
        assert_eq!(stats.cumulative_tokens_saved, 8);
        assert!((stats.cumulative_co2_reduced - 2.5).abs() < 1e-9);
        assert_eq!(stats.last_optimization_at, Some(start));
    }

    #[test]
    fn salvage_reads_numeric_strings_and_drops_garbage() {
        let fallback = Utc::now();
        let value = serde_json::json!({
            "optimizations": "7",
            "tokensSaved": 40,
            "co2Reduced": "012.50%",
            "installDate": "not a date",
        });
        let stats = Stats::salvage(&value, fallback).unwrap();
        assert_eq!(stats.optimizations_count, 7);
        assert_eq!(stats.cumulative_tokens_saved, 40);
        assert_eq!(stats.cumulative_co2_reduced, 0.0);
        assert_eq!(stats.install_date, fallback);
        assert!(stats.last_optimization_at.is_none());
    }

    #[test]
    fn salvage_rejects_non_objects() {
        assert!(Stats::salvage(&serde_json::json!("oops"), Utc::now()).is_none());
    }

    #[test]
    fn apply_never_decrements() {
        let mut stats = Stats::new(Utc::now());
        stats.apply(0, -4.0, Utc::now());
        stats.apply(0, f64::NAN, Utc::now());
        assert_eq!(stats.cumulative_co2_reduced, 0.0);
        assert_eq!(stats.optimizations_count, 2);
    }

    #[test]
    fn first_load_persists_defaults() {
        let store = StatsStore::in_memory();
        let first = store.load().unwrap();
        let second = store.load().unwrap();
        assert_eq!(first.optimizations_count, 0);
        assert_eq!(first.install_date, second.install_date);
    }

    #[test]
    fn record_then_load_round_trips() {
        let store = StatsStore::in_memory();
        store.load().unwrap();
        let after = store.record(5, 2.0).unwrap();
        assert_eq!(after.optimizations_count, 1);
        assert_eq!(after.cumulative_tokens_saved, 5);
        assert_eq!(store.load().unwrap(), after);
    }

    #[test]
    fn reset_zeroes_totals() {
        let store = StatsStore::in_memory();
        store.record(5, 2.0).unwrap();
        let fresh = store.reset().unwrap();
        assert_eq!(fresh.optimizations_count, 0);
        assert_eq!(store.load().unwrap().cumulative_tokens_saved, 0);
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let json = serde_json::to_value(Stats::new(Utc::now())).unwrap();
        for key in ["optimizations", "tokensSaved", "co2Reduced", "installDate", "lastOptimization"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn legacy_record_without_last_optimization_parses() {
        let stats: Stats = serde_json::from_str(
            r#"{"optimizations":3,"tokensSaved":12,"co2Reduced":1.5,"installDate":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(stats.optimizations_count, 3);
        assert!(stats.last_optimization_at.is_none());
    }
}
