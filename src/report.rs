//! Run report assembly: the `{results, summary}` shape consumed by report
//! renderers and the `--report` flag.

use crate::model::TestResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// Milliseconds spent executing requests.
    pub total_execution_time: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// The report shape: flattened assertion results plus the summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub results: Vec<TestResult>,
    pub summary: Summary,
    pub status: RunStatus,
}

impl Report {
    /// Builds the report from flattened assertion results.
    #[must_use]
    pub fn from_results(
        results: Vec<TestResult>,
        total_execution_time: Duration,
        start_time: DateTime<Utc>,
        status: RunStatus,
    ) -> Self {
        let passed_tests = results.iter().filter(|r| r.passed).count();
        let failed_tests = results.len() - passed_tests;
        #[allow(clippy::cast_possible_truncation)]
        let summary = Summary {
            total_tests: results.len(),
            passed_tests,
            failed_tests,
            total_execution_time: total_execution_time.as_millis() as u64,
            start_time,
            end_time: Utc::now(),
        };
        Self {
            results,
            summary,
            status,
        }
    }

    /// True when every assertion passed and the run was not cancelled.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.status == RunStatus::Completed && self.summary.failed_tests == 0
    }
}
