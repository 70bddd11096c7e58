//! Irreversible deletions: processes, directories, files and registry keys.
//!
//! Every operation here is a bulk loop over independent items. One item
//! failing never stops the others; each call returns a [`BulkReport`]
//! pairing every item with what happened to it.

pub mod files;
pub mod keys;
pub mod processes;

use serde::Serialize;

use crate::common::errors::RemovalError;

pub use files::{remove_directories, system_cleanup, SweepReport};
pub use keys::{remove_registry_keys, scan_uninstall_entries};
pub use processes::terminate_processes;

/// What happened to one item of a bulk operation
#[derive(Debug)]
pub enum ItemOutcome {
    /// The action took effect
    Done,
    /// Nothing to do (already gone); not counted, not a warning
    Absent,
    /// Deliberately left alone
    Refused(String),
    /// The action was attempted and failed
    Failed(RemovalError),
}

impl ItemOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ItemOutcome::Done)
    }

    /// Outcome of a fallible action where "not found" means nothing to do
    pub fn from_result(result: Result<(), RemovalError>) -> Self {
        match result {
            Ok(()) => ItemOutcome::Done,
            Err(e) if e.is_not_found() => ItemOutcome::Absent,
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}

/// Per-item results of one bulk operation, in processing order
#[derive(Debug)]
pub struct BulkReport<T> {
    pub items: Vec<(T, ItemOutcome)>,
}

impl<T> Default for BulkReport<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> BulkReport<T> {
    pub fn push(&mut self, item: T, outcome: ItemOutcome) {
        self.items.push((item, outcome));
    }

    /// Items whose action took effect
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|(_, o)| o.is_done()).count()
    }

    pub fn done(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter(|(_, o)| o.is_done()).map(|(t, _)| t)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&T, &RemovalError)> {
        self.items.iter().filter_map(|(t, o)| match o {
            ItemOutcome::Failed(e) => Some((t, e)),
            _ => None,
        })
    }
}

/// Serializable per-item line for summaries
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeLine {
    pub item: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl<T> BulkReport<T> {
    /// One summary line per item that was not simply absent
    pub fn lines_by(&self, label: impl Fn(&T) -> String) -> Vec<OutcomeLine> {
        self.items
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, ItemOutcome::Absent))
            .map(|(item, outcome)| {
                let (kind, detail) = match outcome {
                    ItemOutcome::Done => ("done", None),
                    ItemOutcome::Absent => ("absent", None),
                    ItemOutcome::Refused(reason) => ("refused", Some(reason.clone())),
                    ItemOutcome::Failed(e) => (e.kind(), Some(e.to_string())),
                };
                OutcomeLine {
                    item: label(item),
                    outcome: kind,
                    detail,
                }
            })
            .collect()
    }
}

impl<T: std::fmt::Display> BulkReport<T> {
    pub fn lines(&self) -> Vec<OutcomeLine> {
        self.lines_by(|item| item.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_only_done() {
        let mut report = BulkReport::default();
        report.push("a", ItemOutcome::Done);
        report.push("b", ItemOutcome::Absent);
        report.push("c", ItemOutcome::Refused("protected".into()));
        report.push(
            "d",
            ItemOutcome::Failed(RemovalError::PermissionDenied { target: "d".into() }),
        );
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.done().copied().collect::<Vec<_>>(), vec!["a"]);

        let lines = report.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].outcome, "permission_denied");
        assert_eq!(lines[1].detail.as_deref(), Some("protected"));
    }

    #[test]
    fn test_from_result_treats_not_found_as_absent() {
        let outcome = ItemOutcome::from_result(Err(RemovalError::NotFound { target: "k".into() }));
        assert!(matches!(outcome, ItemOutcome::Absent));
    }
}
