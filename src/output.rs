//! Comparison verdict types.
//!
//! A [`ComparisonResult`] is the only thing a session hands back. It is
//! replaced wholesale at every terminal step (configuration failure or a
//! completed `compare`), never merged with a previous verdict.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Terminal status of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComparisonStatus {
    /// `compare` has not run yet and nothing failed.
    #[default]
    #[serde(rename = "not executed")]
    NotExecuted,
    #[serde(rename = "passed")]
    Passed,
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparisonStatus::NotExecuted => "not executed",
            ComparisonStatus::Passed => "passed",
            ComparisonStatus::Failed => "failed",
        })
    }
}

/// Outcome of one compared image pair (a full page or one crop of it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageComparison {
    /// 0-indexed page the pair was rendered from.
    pub page_index: usize,
    /// Index of the crop within its page, `None` for a full page.
    pub crop_index: Option<usize>,
    pub status: ComparisonStatus,
    /// Pixels that differ beyond the configured threshold.
    pub diff_pixels: u64,
    /// Diff image written by the comparator, when it wrote one.
    pub diff_png: Option<PathBuf>,
    pub message: Option<String>,
}

impl PageComparison {
    pub fn passed(page_index: usize, crop_index: Option<usize>) -> Self {
        Self {
            page_index,
            crop_index,
            status: ComparisonStatus::Passed,
            diff_pixels: 0,
            diff_png: None,
            message: None,
        }
    }

    pub fn failed(page_index: usize, crop_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            page_index,
            crop_index,
            status: ComparisonStatus::Failed,
            diff_pixels: 0,
            diff_png: None,
            message: Some(message.into()),
        }
    }
}

/// Verdict of a comparison, held by the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub status: ComparisonStatus,
    /// Human-readable explanation, set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Per-image outcomes produced by the diff collaborator.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub details: Vec<PageComparison>,
}

impl ComparisonResult {
    /// The initial "not executed" result.
    pub fn not_executed() -> Self {
        Self::default()
    }

    pub fn passed() -> Self {
        Self {
            status: ComparisonStatus::Passed,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ComparisonStatus::Failed,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    /// Attach per-image details.
    pub fn with_details(mut self, details: Vec<PageComparison>) -> Self {
        self.details = details;
        self
    }

    pub fn is_passed(&self) -> bool {
        self.status == ComparisonStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ComparisonStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialises_with_spaces() {
        let json = serde_json::to_string(&ComparisonStatus::NotExecuted).unwrap();
        assert_eq!(json, "\"not executed\"");
        assert_eq!(ComparisonStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn failed_result_carries_message() {
        let r = ComparisonResult::failed("boom");
        assert!(r.is_failed());
        assert_eq!(r.message.as_deref(), Some("boom"));

        let json = serde_json::to_value(ComparisonResult::passed()).unwrap();
        assert_eq!(json["status"], "passed");
        assert!(json.get("message").is_none());
        assert!(json.get("details").is_none());
    }
}
