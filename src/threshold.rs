/// Threshold evaluation: classify a snapshot against a limit policy.
///
/// Each dimension is checked twice, independently:
/// - exceeded: the value is strictly greater than the limit
/// - approaching: the value is at least 90% of the limit
///
/// A dimension can be both at once. Exceeded always wins when a single
/// verdict is needed.
use crate::metrics::MetricsSnapshot;
use crate::policy::LimitPolicy;

/// Fraction of a limit at which a dimension counts as approaching it.
pub const APPROACH_RATIO: f64 = 0.9;

/// The monitored resource dimensions, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Memory,
    CpuTime,
    WallTime,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Memory, Dimension::CpuTime, Dimension::WallTime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Memory => "Memory",
            Dimension::CpuTime => "CpuTime",
            Dimension::WallTime => "WallTime",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a single dimension, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verdict {
    Normal,
    Approaching,
    Exceeded,
}

/// Both checks for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimensionStatus {
    pub exceeded: bool,
    pub approaching: bool,
}

impl DimensionStatus {
    fn check(value: f64, limit: u64) -> Self {
        let limit = limit as f64;
        Self {
            exceeded: value > limit,
            approaching: value / limit >= APPROACH_RATIO,
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.exceeded {
            Verdict::Exceeded
        } else if self.approaching {
            Verdict::Approaching
        } else {
            Verdict::Normal
        }
    }
}

/// Result of evaluating one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub memory: DimensionStatus,
    pub cpu_time: DimensionStatus,
    pub wall_time: DimensionStatus,
}

impl Evaluation {
    pub fn status(&self, dimension: Dimension) -> DimensionStatus {
        match dimension {
            Dimension::Memory => self.memory,
            Dimension::CpuTime => self.cpu_time,
            Dimension::WallTime => self.wall_time,
        }
    }

    pub fn verdict(&self, dimension: Dimension) -> Verdict {
        self.status(dimension).verdict()
    }

    /// True if any dimension is over its limit.
    pub fn aggregate_exceeded(&self) -> bool {
        self.memory.exceeded || self.cpu_time.exceeded || self.wall_time.exceeded
    }

    /// True if any dimension is at or above 90% of its limit, exceeded or not.
    pub fn aggregate_approaching(&self) -> bool {
        self.memory.approaching || self.cpu_time.approaching || self.wall_time.approaching
    }

    /// The most severe verdict across all dimensions.
    pub fn aggregate(&self) -> Verdict {
        Dimension::ALL
            .iter()
            .map(|d| self.verdict(*d))
            .max()
            .unwrap_or(Verdict::Normal)
    }

    /// Approaching dimensions in Memory, CpuTime, WallTime order.
    pub fn approaching(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.status(*d).approaching)
            .collect()
    }

    /// Exceeded dimensions in Memory, CpuTime, WallTime order.
    pub fn exceeded(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.status(*d).exceeded)
            .collect()
    }
}

/// Classify `snapshot` against `policy`. Pure.
pub fn evaluate(snapshot: &MetricsSnapshot, policy: &LimitPolicy) -> Evaluation {
    Evaluation {
        memory: DimensionStatus::check(snapshot.memory_bytes as f64, policy.memory_limit_bytes()),
        cpu_time: DimensionStatus::check(snapshot.cpu_time_ms, policy.cpu_time_limit_ms()),
        wall_time: DimensionStatus::check(snapshot.wall_time_ms, policy.wall_time_limit_ms()),
    }
}
