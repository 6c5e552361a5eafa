//! Error history for the stage.
//!
//! Records are kept in memory (capped), echoed through `log` with a cooldown so a
//! burst of failures does not flood the output, and the serious ones are appended
//! to an optional report file. The report file is best effort: any I/O or parse
//! failure is dropped.

use crate::clock::Clock;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MAX_ERROR_HISTORY: usize = 50;
pub const MAX_REPORTS: usize = 10;
pub const LOG_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Whether the record goes to the report file
    pub fn is_reportable(self) -> bool {
        self >= Severity::High
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: u64,
    pub timestamp_ms: i64,
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub recent: Vec<ErrorRecord>,
}

#[derive(Serialize)]
struct ErrorExport<'a> {
    timestamp_ms: i64,
    stats: ErrorStats,
    errors: &'a VecDeque<ErrorRecord>,
}

pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
    next_id: u64,
    last_emitted: Option<Instant>,
    report_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl ErrorLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: VecDeque::with_capacity(MAX_ERROR_HISTORY),
            next_id: 1,
            last_emitted: None,
            report_path: None,
            clock,
        }
    }

    pub fn with_report_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.set_report_file(path);
        self
    }

    pub fn set_report_file(&mut self, path: impl Into<PathBuf>) {
        self.report_path = Some(path.into());
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    /// Store a record, echo it unless throttled, and report it if serious
    pub fn record(
        &mut self,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> u64 {
        let record = ErrorRecord {
            id: self.next_id,
            timestamp_ms: self.clock.unix_millis(),
            severity,
            category: category.into(),
            message: message.into(),
        };
        self.next_id += 1;

        if !self.should_throttle() {
            emit(&record);
        }
        if severity.is_reportable() {
            self.append_report(&record);
        }

        let id = record.id;
        self.records.push_back(record);
        while self.records.len() > MAX_ERROR_HISTORY {
            self.records.pop_front();
        }
        id
    }

    /// Record an `anyhow` error with its full context chain
    pub fn record_error(&mut self, severity: Severity, category: &str, err: &anyhow::Error) -> u64 {
        self.record(severity, category, format!("{:#}", err))
    }

    fn should_throttle(&mut self) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.last_emitted {
            if now.saturating_duration_since(last) < LOG_COOLDOWN {
                return true;
            }
        }
        self.last_emitted = Some(now);
        false
    }

    fn append_report(&self, record: &ErrorRecord) {
        let Some(path) = &self.report_path else {
            return;
        };
        let mut reports: Vec<ErrorRecord> = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        reports.push(record.clone());
        let excess = reports.len().saturating_sub(MAX_REPORTS);
        reports.drain(..excess);
        let written = serde_json::to_string_pretty(&reports)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = written {
            debug!("Error report not written to {}: {}", path.display(), e);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// The last `count` records, oldest first
    pub fn recent(&self, count: usize) -> Vec<ErrorRecord> {
        let skip = self.records.len().saturating_sub(count);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> ErrorStats {
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|&s| (s, 0)).collect();
        let mut by_category = BTreeMap::new();
        for record in &self.records {
            *by_severity.entry(record.severity).or_insert(0) += 1;
            *by_category.entry(record.category.clone()).or_insert(0) += 1;
        }
        ErrorStats {
            total: self.records.len(),
            by_severity,
            by_category,
            recent: self.recent(10),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        let export = ErrorExport {
            timestamp_ms: self.clock.unix_millis(),
            stats: self.stats(),
            errors: &self.records,
        };
        serde_json::to_string_pretty(&export).context("Failed to serialize error log")
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

fn emit(record: &ErrorRecord) {
    let category = record.category.to_uppercase();
    match record.severity {
        Severity::Critical => error!("[{}] CRITICAL: {}", category, record.message),
        Severity::High => error!("[{}] HIGH: {}", category, record.message),
        Severity::Medium => warn!("[{}] MEDIUM: {}", category, record.message),
        Severity::Low => info!("[{}] LOW: {}", category, record.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn error_log() -> (Arc<ManualClock>, ErrorLog) {
        let clock = Arc::new(ManualClock::new());
        (clock.clone(), ErrorLog::new(clock))
    }

    #[test]
    fn test_history_is_capped() {
        let (_, mut errors) = error_log();
        for i in 0..(MAX_ERROR_HISTORY + 7) {
            errors.record(Severity::Low, "input", format!("error {}", i));
        }
        assert_eq!(errors.len(), MAX_ERROR_HISTORY);
        assert_eq!(errors.all().next().unwrap().message, "error 7");
    }

    #[test]
    fn test_stats_counts() {
        let (_, mut errors) = error_log();
        errors.record(Severity::Critical, "loading", "model missing");
        errors.record(Severity::Medium, "animation", "clip missing");
        errors.record(Severity::Medium, "animation", "clip missing again");

        let stats = errors.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_severity[&Severity::Medium], 2);
        assert_eq!(stats.by_severity[&Severity::Low], 0);
        assert_eq!(stats.by_category["animation"], 2);
        assert_eq!(stats.recent.len(), 3);
        assert_eq!(stats.recent[2].message, "clip missing again");
    }

    #[test]
    fn test_recent_limits() {
        let (_, mut errors) = error_log();
        for i in 0..15 {
            errors.record(Severity::Low, "x", i.to_string());
        }
        let recent = errors.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].message, "5");
        assert_eq!(errors.stats().recent.len(), 10);
    }

    #[test]
    fn test_throttle_window() {
        let (clock, mut errors) = error_log();
        assert!(!errors.should_throttle());
        assert!(errors.should_throttle());
        clock.advance(Duration::from_millis(999));
        assert!(errors.should_throttle());
        clock.advance(Duration::from_millis(1));
        assert!(!errors.should_throttle());
    }

    #[test]
    fn test_export_json() {
        let (_, mut errors) = error_log();
        errors.record(Severity::High, "render", "lost context");
        let json: serde_json::Value = serde_json::from_str(&errors.export_json().unwrap()).unwrap();
        assert_eq!(json["stats"]["total"], 1);
        assert_eq!(json["errors"][0]["severity"], "high");
        assert_eq!(json["stats"]["by_severity"]["high"], 1);

        errors.clear();
        assert!(errors.is_empty());
    }

    #[test]
    fn test_report_file_keeps_last_entries() {
        let path = std::env::temp_dir().join(format!("robot_stage_reports_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let clock = Arc::new(ManualClock::new());
        let mut errors = ErrorLog::new(clock).with_report_file(&path);

        errors.record(Severity::Low, "input", "not reported");
        for i in 0..(MAX_REPORTS + 3) {
            errors.record(Severity::Critical, "loading", format!("fatal {}", i));
        }

        let reports: Vec<ErrorRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reports.len(), MAX_REPORTS);
        assert_eq!(reports[0].message, "fatal 3");
        assert!(reports.iter().all(|r| r.severity == Severity::Critical));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unwritable_report_is_swallowed() {
        let clock = Arc::new(ManualClock::new());
        let mut errors = ErrorLog::new(clock)
            .with_report_file(std::env::temp_dir().join("missing-dir-robot-stage/x/reports.json"));
        errors.record(Severity::Critical, "loading", "still recorded");
        assert_eq!(errors.len(), 1);
    }
}
