/// Event records: what the supervisor writes to the event log each tick and at exit.
///
/// `Event` carries exactly what each kind of message needs; `EventRecord` is
/// the flattened, timestamped form handed to the sink.
use crate::metrics::MetricsSnapshot;
use crate::threshold::{Dimension, Evaluation};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Record type tag as written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InternalError,
    LimitError,
    Warning,
    Notification,
    Exit,
}

/// Identity of the supervised process, stamped on every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub name: String,
}

/// One classified observation or lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The process exited on its own with a nonzero code.
    InternalError { exit_code: i32 },
    /// A limit was exceeded; the process is being killed.
    LimitError { approaching: Vec<Dimension> },
    /// At least one dimension is at 90% or more of its limit.
    Warning {
        usage: MetricsSnapshot,
        approaching: Vec<Dimension>,
    },
    /// Everything within limits.
    Notification { usage: MetricsSnapshot },
    /// The process exited on its own with code 0.
    Exit,
}

impl Event {
    /// Classify one tick. Exceeded is checked first since it takes priority.
    pub fn for_tick(snapshot: &MetricsSnapshot, evaluation: &Evaluation) -> Self {
        if evaluation.aggregate_exceeded() {
            Event::LimitError {
                approaching: evaluation.approaching(),
            }
        } else if evaluation.aggregate_approaching() {
            Event::Warning {
                usage: *snapshot,
                approaching: evaluation.approaching(),
            }
        } else {
            Event::Notification { usage: *snapshot }
        }
    }

    /// Classify a natural exit.
    pub fn for_exit(exit_code: i32) -> Self {
        if exit_code == 0 {
            Event::Exit
        } else {
            Event::InternalError { exit_code }
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::InternalError { .. } => EventKind::InternalError,
            Event::LimitError { .. } => EventKind::LimitError,
            Event::Warning { .. } => EventKind::Warning,
            Event::Notification { .. } => EventKind::Notification,
            Event::Exit => EventKind::Exit,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Event::LimitError { approaching } => {
                let mut msg = "Limits exceeded, process stopped.".to_string();
                if !approaching.is_empty() {
                    msg.push_str(&format!(" Limits involved: {}", join(approaching)));
                }
                msg
            }
            Event::Warning { usage, approaching } => format!(
                "Process is approaching its limits. {} Limits at risk: {}",
                usage_figures(usage),
                join(approaching)
            ),
            Event::Notification { usage } => {
                format!("Process is within limits. {}", usage_figures(usage))
            }
            Event::InternalError { exit_code } => {
                format!("Process exited with an error, exit code {exit_code}")
            }
            Event::Exit => "Process exited with code 0".to_string(),
        }
    }
}

fn usage_figures(usage: &MetricsSnapshot) -> String {
    format!(
        "memory: {:.2} MiB ({} bytes), cpu time: {:.0} ms, wall time: {:.0} ms.",
        usage.memory_mib(),
        usage.memory_bytes,
        usage.cpu_time_ms,
        usage.wall_time_ms
    )
}

fn join(dimensions: &[Dimension]) -> String {
    dimensions
        .iter()
        .map(Dimension::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single line in the event log. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub process_id: u32,
    pub process_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record stamped with the current time.
    pub fn new(event: &Event, process: &ProcessIdentity) -> Self {
        Self::at(event, process, Utc::now())
    }

    pub fn at(event: &Event, process: &ProcessIdentity, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: event.kind(),
            process_id: process.pid,
            process_name: process.name.clone(),
            message: event.message(),
            timestamp,
        }
    }
}
