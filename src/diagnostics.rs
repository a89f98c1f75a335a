//! In-memory diagnostic log with filtering plus timing and numeric metrics.
//!
//! The log is shared across concurrent tasks and internally synchronized.
//! With a max-entry cap configured, the oldest entries are evicted FIFO.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Severity of a diagnostic entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl DiagnosticLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    pub level: DiagnosticLevel,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub context: Option<HashMap<String, String>>,
    pub source: Option<String>,
}

/// Aggregate over values recorded under one metric name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub count: u64,
    pub total: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<DiagnosticEntry>,
    running_timers: HashMap<String, Instant>,
    timings: HashMap<String, Vec<Duration>>,
    metrics: HashMap<String, Vec<f64>>,
}

/// Shared diagnostic log.
#[derive(Debug)]
pub struct DiagnosticLog {
    max_entries: Option<usize>,
    inner: Mutex<Inner>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DiagnosticLog {
    #[must_use]
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn log(&self, level: DiagnosticLevel, message: impl Into<String>) {
        self.log_with(level, message, None, None);
    }

    pub fn log_with(
        &self,
        level: DiagnosticLevel,
        message: impl Into<String>,
        source: Option<&str>,
        context: Option<HashMap<String, String>>,
    ) {
        let entry = DiagnosticEntry {
            level,
            timestamp: Utc::now(),
            message: message.into(),
            context,
            source: source.map(String::from),
        };
        let mut inner = self.inner.lock().expect("diagnostic lock poisoned");
        inner.entries.push_back(entry);
        if let Some(cap) = self.max_entries {
            while inner.entries.len() > cap {
                inner.entries.pop_front();
            }
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(DiagnosticLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(DiagnosticLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(DiagnosticLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(DiagnosticLevel::Error, message);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.inner
            .lock()
            .expect("diagnostic lock poisoned")
            .entries
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn filter_by_level(&self, level: DiagnosticLevel) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.level == level)
    }

    #[must_use]
    pub fn filter_by_levels(&self, levels: &[DiagnosticLevel]) -> Vec<DiagnosticEntry> {
        self.filtered(|e| levels.contains(&e.level))
    }

    #[must_use]
    pub fn filter_min_level(&self, min: DiagnosticLevel) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.level >= min)
    }

    #[must_use]
    pub fn filter_by_source(&self, source: &str) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.source.as_deref() == Some(source))
    }

    #[must_use]
    pub fn filter_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.timestamp >= from && e.timestamp <= to)
    }

    fn filtered(&self, predicate: impl Fn(&DiagnosticEntry) -> bool) -> Vec<DiagnosticEntry> {
        self.inner
            .lock()
            .expect("diagnostic lock poisoned")
            .entries
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Starts (or restarts) a named timer.
    pub fn start_timing(&self, name: impl Into<String>) {
        self.inner
            .lock()
            .expect("diagnostic lock poisoned")
            .running_timers
            .insert(name.into(), Instant::now());
    }

    /// Stops a named timer and records its elapsed duration. Returns `None`
    /// when no timer with that name is running.
    pub fn end_timing(&self, name: &str) -> Option<Duration> {
        let mut inner = self.inner.lock().expect("diagnostic lock poisoned");
        let started = inner.running_timers.remove(name)?;
        let elapsed = started.elapsed();
        inner.timings.entry(name.to_string()).or_default().push(elapsed);
        Some(elapsed)
    }

    /// Aggregate timing stats in milliseconds for a timer name.
    #[must_use]
    pub fn timing_stats(&self, name: &str) -> Option<MetricStats> {
        let inner = self.inner.lock().expect("diagnostic lock poisoned");
        let samples: Vec<f64> = inner
            .timings
            .get(name)?
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        aggregate(&samples)
    }

    /// Records one sample under a custom numeric metric.
    pub fn record_metric(&self, name: impl Into<String>, value: f64) {
        self.inner
            .lock()
            .expect("diagnostic lock poisoned")
            .metrics
            .entry(name.into())
            .or_default()
            .push(value);
    }

    #[must_use]
    pub fn metric_stats(&self, name: &str) -> Option<MetricStats> {
        let inner = self.inner.lock().expect("diagnostic lock poisoned");
        aggregate(inner.metrics.get(name)?)
    }
}

fn aggregate(samples: &[f64]) -> Option<MetricStats> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().sum();
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    #[allow(clippy::cast_precision_loss)]
    Some(MetricStats {
        count: samples.len() as u64,
        total,
        avg: total / samples.len() as f64,
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(DiagnosticLevel::Debug < DiagnosticLevel::Info);
        assert!(DiagnosticLevel::Info < DiagnosticLevel::Warn);
        assert!(DiagnosticLevel::Warn < DiagnosticLevel::Error);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let log = DiagnosticLog::new(Some(2));
        log.info("first");
        log.info("second");
        log.info("third");
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "third");
    }

    #[test]
    fn level_filters() {
        let log = DiagnosticLog::default();
        log.debug("d");
        log.info("i");
        log.warn("w");
        log.error("e");

        assert_eq!(log.filter_by_level(DiagnosticLevel::Warn).len(), 1);
        assert_eq!(
            log.filter_by_levels(&[DiagnosticLevel::Debug, DiagnosticLevel::Error])
                .len(),
            2
        );
        assert_eq!(log.filter_min_level(DiagnosticLevel::Warn).len(), 2);
    }

    #[test]
    fn source_filter() {
        let log = DiagnosticLog::default();
        log.log_with(DiagnosticLevel::Info, "from runner", Some("runner"), None);
        log.log_with(DiagnosticLevel::Info, "from cache", Some("cache"), None);
        let filtered = log.filter_by_source("runner");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].message, "from runner");
    }

    #[test]
    fn time_range_filter() {
        let log = DiagnosticLog::default();
        let before = Utc::now();
        log.info("inside");
        let after = Utc::now();
        assert_eq!(log.filter_by_time_range(before, after).len(), 1);
        let past = before - chrono::Duration::hours(2);
        let earlier = before - chrono::Duration::hours(1);
        assert!(log.filter_by_time_range(past, earlier).is_empty());
    }

    #[test]
    fn timing_pairs_record_durations() {
        let log = DiagnosticLog::default();
        log.start_timing("parse");
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = log.end_timing("parse").unwrap();
        assert!(elapsed >= Duration::from_millis(5));

        let stats = log.timing_stats("parse").unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.min >= 5.0);

        assert!(log.end_timing("never-started").is_none());
    }

    #[test]
    fn numeric_metric_aggregation() {
        let log = DiagnosticLog::default();
        log.record_metric("latency", 10.0);
        log.record_metric("latency", 30.0);
        log.record_metric("latency", 20.0);

        let stats = log.metric_stats("latency").unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.total - 60.0).abs() < f64::EPSILON);
        assert!((stats.avg - 20.0).abs() < f64::EPSILON);
        assert!((stats.min - 10.0).abs() < f64::EPSILON);
        assert!((stats.max - 30.0).abs() < f64::EPSILON);

        assert!(log.metric_stats("unknown").is_none());
    }

    #[test]
    fn context_map_is_preserved() {
        let log = DiagnosticLog::default();
        let mut context = HashMap::new();
        context.insert("request".to_string(), "login".to_string());
        log.log_with(DiagnosticLevel::Error, "failed", Some("runner"), Some(context));
        let entry = &log.entries()[0];
        assert_eq!(
            entry.context.as_ref().unwrap().get("request").unwrap(),
            "login"
        );
    }
}
