use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// Where in the pipeline a device ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Validation,
    Encoding,
    Authentication,
    Backup,
    Flush,
    Enqueue,
    Confirmation,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Generated,
    Confirmed,
    Delivered,
    Failed,
    NotAttempted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Generated => "generated",
            Outcome::Confirmed => "confirmed",
            Outcome::Delivered => "delivered",
            Outcome::Failed => "failed",
            Outcome::NotAttempted => "not-attempted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOutcome {
    pub stage: Stage,

    pub outcome: Outcome,

    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DeviceOutcome {
    pub fn failed(stage: Stage, attempts: u32, reason: impl ToString) -> Self {
        Self {
            stage,
            outcome: Outcome::Failed,
            attempts,
            reason: Some(reason.to_string()),
        }
    }

    pub fn not_attempted(reason: Option<String>) -> Self {
        Self {
            stage: Stage::Authentication,
            outcome: Outcome::NotAttempted,
            attempts: 0,
            reason,
        }
    }
}

/// Per-device results of a run, keyed by device identifier (or source row
/// for records without a usable identifier).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub devices: IndexMap<String, DeviceOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn record(&mut self, key: impl Into<String>, outcome: DeviceOutcome) {
        self.devices.insert(key.into(), outcome);
    }

    pub fn get(&self, key: &str) -> Option<&DeviceOutcome> {
        self.devices.get(key)
    }

    /// Later entries win; the first abort reason is kept.
    pub fn merge(&mut self, other: RunReport) {
        self.devices.extend(other.devices);
        if self.aborted.is_none() {
            self.aborted = other.aborted;
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.devices.values().filter(|d| d.outcome == outcome).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DeviceOutcome)> {
        self.devices
            .iter()
            .filter(|(_, d)| d.outcome == Outcome::Failed)
            .map(|(k, d)| (k.as_str(), d))
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
            && self
                .devices
                .values()
                .all(|d| !matches!(d.outcome, Outcome::Failed | Outcome::NotAttempted))
    }

    pub fn summary(&self) -> String {
        [
            Outcome::Generated,
            Outcome::Confirmed,
            Outcome::Delivered,
            Outcome::Failed,
            Outcome::NotAttempted,
        ]
        .into_iter()
        .filter_map(|o| match self.count(o) {
            0 => None,
            n => Some(format!("{n} {o}")),
        })
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(outcome: Outcome) -> DeviceOutcome {
        DeviceOutcome {
            stage: Stage::Done,
            outcome,
            attempts: 1,
            reason: None,
        }
    }

    #[test]
    fn merge_and_count() {
        let mut report = RunReport::default();
        report.record("A", ok(Outcome::Generated));
        report.record("B", DeviceOutcome::failed(Stage::Validation, 0, "sst: missing"));

        let mut delivery = RunReport::default();
        delivery.record("A", ok(Outcome::Confirmed));
        report.merge(delivery);

        assert_eq!(report.count(Outcome::Confirmed), 1);
        assert_eq!(report.count(Outcome::Generated), 0);
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_success());
        assert_eq!(report.summary(), "1 confirmed, 1 failed");
        assert_eq!(report.devices.keys().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn serializes_compactly() {
        let mut report = RunReport::default();
        report.record("A", ok(Outcome::NotAttempted));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "devices": {"A": {"stage": "done", "outcome": "not-attempted", "attempts": 1}}
            })
        );
    }
}
