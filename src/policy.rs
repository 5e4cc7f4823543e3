/// Limit policy: the three thresholds a supervised run is held to.
///
/// A policy is immutable once built and every limit is strictly positive.
/// Policies come from a `LimitPolicySource`; `resolve` never fails and
/// substitutes the defaults whenever the source cannot produce one.
use crate::config::ConfigError;

/// Default memory limit: 256 MiB.
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 256 * 1024 * 1024;
/// Default accumulated CPU time limit.
pub const DEFAULT_CPU_TIME_LIMIT_MS: u64 = 10_000;
/// Default wall-clock runtime limit.
pub const DEFAULT_WALL_TIME_LIMIT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    memory_limit_bytes: u64,
    cpu_time_limit_ms: u64,
    wall_time_limit_ms: u64,
}

impl LimitPolicy {
    /// Build a policy, rejecting any zero limit.
    pub fn new(
        memory_limit_bytes: u64,
        cpu_time_limit_ms: u64,
        wall_time_limit_ms: u64,
    ) -> Result<Self, PolicyError> {
        if memory_limit_bytes == 0 {
            return Err(PolicyError::NonPositive {
                field: "memory_limit_bytes",
            });
        }
        if cpu_time_limit_ms == 0 {
            return Err(PolicyError::NonPositive {
                field: "cpu_time_limit_ms",
            });
        }
        if wall_time_limit_ms == 0 {
            return Err(PolicyError::NonPositive {
                field: "wall_time_limit_ms",
            });
        }
        Ok(Self {
            memory_limit_bytes,
            cpu_time_limit_ms,
            wall_time_limit_ms,
        })
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
    }

    pub fn cpu_time_limit_ms(&self) -> u64 {
        self.cpu_time_limit_ms
    }

    pub fn wall_time_limit_ms(&self) -> u64 {
        self.wall_time_limit_ms
    }

    /// Return a copy with any of the given limits replaced.
    ///
    /// Overrides of zero are rejected the same way `new` rejects them.
    pub fn with_overrides(
        &self,
        memory_limit_bytes: Option<u64>,
        cpu_time_limit_ms: Option<u64>,
        wall_time_limit_ms: Option<u64>,
    ) -> Result<Self, PolicyError> {
        Self::new(
            memory_limit_bytes.unwrap_or(self.memory_limit_bytes),
            cpu_time_limit_ms.unwrap_or(self.cpu_time_limit_ms),
            wall_time_limit_ms.unwrap_or(self.wall_time_limit_ms),
        )
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            cpu_time_limit_ms: DEFAULT_CPU_TIME_LIMIT_MS,
            wall_time_limit_ms: DEFAULT_WALL_TIME_LIMIT_MS,
        }
    }
}

/// A limit policy that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A limit was zero.
    NonPositive { field: &'static str },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::NonPositive { field } => {
                write!(f, "limit {} must be greater than zero", field)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Anything that can produce a limit policy (a config file, a fixed value in tests).
pub trait LimitPolicySource {
    fn load(&self) -> Result<LimitPolicy, ConfigError>;
}

impl LimitPolicySource for LimitPolicy {
    fn load(&self) -> Result<LimitPolicy, ConfigError> {
        Ok(*self)
    }
}

/// Load a policy from `source`, falling back to the defaults on any failure.
///
/// The failure is only logged; callers always get a usable policy.
pub fn resolve(source: &dyn LimitPolicySource) -> LimitPolicy {
    match source.load() {
        Ok(policy) => policy,
        Err(ConfigError::NotFound { path }) => {
            tracing::debug!(
                path = %path.display(),
                "no limits file found, using default limits"
            );
            LimitPolicy::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load limits, using default limits");
            LimitPolicy::default()
        }
    }
}
