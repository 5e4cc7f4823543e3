/// Supervision loop: launch one process, sample it every tick, and kill it
/// when a limit is exceeded.
///
/// A run moves Starting -> Running -> Killed | Exited. Exactly one terminal
/// event is written per run: the LimitError that precedes the kill, or the
/// Exit/InternalError written when the process ends on its own.
use crate::event::{Event, EventRecord, ProcessIdentity};
use crate::metrics::MetricsSnapshot;
use crate::policy::LimitPolicy;
use crate::process::{ChildProcess, ProcessHandle, StartError};
use crate::sink::EventSink;
use crate::threshold::{self, Dimension};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A limit was exceeded and the process was killed.
    Killed {
        exceeded: Vec<Dimension>,
        ticks: u64,
    },
    /// The process ended on its own.
    Exited { exit_code: i32, ticks: u64 },
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Killed { exceeded, ticks } => {
                let names: Vec<&str> = exceeded.iter().map(Dimension::as_str).collect();
                write!(
                    f,
                    "killed after {} ticks: exceeded {}",
                    ticks,
                    names.join(", ")
                )
            }
            RunOutcome::Exited { exit_code, ticks } => {
                write!(f, "exited with code {} after {} ticks", exit_code, ticks)
            }
        }
    }
}

/// Drives one supervised run. Owns the policy and the sink for its lifetime.
pub struct Supervisor<S> {
    policy: LimitPolicy,
    tick_interval: Duration,
    sink: S,
    dropped_events: u64,
}

impl<S: EventSink> Supervisor<S> {
    pub fn new(policy: LimitPolicy, tick_interval: Duration, sink: S) -> Self {
        Self {
            policy,
            tick_interval,
            sink,
            dropped_events: 0,
        }
    }

    /// Number of events the sink failed to persist.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    #[cfg(test)]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Start `program` and supervise it to completion.
    ///
    /// A start failure is the only error; nothing is written to the sink in that case.
    pub async fn run(&mut self, program: &str, args: &[String]) -> Result<RunOutcome, StartError> {
        let mut child = ChildProcess::spawn(program, args)?;
        let outcome = self.supervise(&mut child).await;
        child.reap().await;
        Ok(outcome)
    }

    /// Supervise an already running process until it exits or is killed.
    pub async fn supervise<H: ProcessHandle>(&mut self, process: &mut H) -> RunOutcome {
        let identity = ProcessIdentity {
            pid: process.id(),
            name: process.name().to_string(),
        };
        info!(
            pid = identity.pid,
            name = %identity.name,
            memory_limit_bytes = self.policy.memory_limit_bytes(),
            cpu_time_limit_ms = self.policy.cpu_time_limit_ms(),
            wall_time_limit_ms = self.policy.wall_time_limit_ms(),
            "supervising process"
        );

        let mut ticks: u64 = 0;
        loop {
            if !process.is_alive() {
                return self.exited(process, &identity, ticks);
            }

            process.refresh();
            // exited between the liveness check and the sample: the counters
            // describe a dead process, so the tick is not classified
            if !process.is_alive() {
                debug!(pid = identity.pid, "process exited while being sampled");
                return self.exited(process, &identity, ticks);
            }
            let snapshot = MetricsSnapshot::capture(&*process, Instant::now());
            let evaluation = threshold::evaluate(&snapshot, &self.policy);
            ticks += 1;
            debug!(
                tick = ticks,
                memory_bytes = snapshot.memory_bytes,
                cpu_time_ms = snapshot.cpu_time_ms,
                wall_time_ms = snapshot.wall_time_ms,
                verdict = ?evaluation.aggregate(),
                "sampled process"
            );

            let event = Event::for_tick(&snapshot, &evaluation);
            match &event {
                Event::LimitError { .. } => {
                    let exceeded = evaluation.exceeded();
                    error!(pid = identity.pid, ?exceeded, "limit exceeded, killing process");
                    // the record goes out before the kill
                    self.emit(&event, &identity);
                    process.kill();
                    return RunOutcome::Killed { exceeded, ticks };
                }
                Event::Warning { approaching, .. } => {
                    warn!(pid = identity.pid, ?approaching, "process approaching limits");
                    self.emit(&event, &identity);
                }
                _ => self.emit(&event, &identity),
            }

            tokio::time::sleep(self.tick_interval).await;
        }
    }

    fn exited<H: ProcessHandle>(
        &mut self,
        process: &H,
        identity: &ProcessIdentity,
        ticks: u64,
    ) -> RunOutcome {
        let exit_code = process.exit_code().unwrap_or(-1);
        self.emit(&Event::for_exit(exit_code), identity);
        RunOutcome::Exited { exit_code, ticks }
    }

    /// Append one event; a sink failure is logged and the record dropped.
    fn emit(&mut self, event: &Event, identity: &ProcessIdentity) {
        let record = EventRecord::new(event, identity);
        if let Err(e) = self.sink.append(record) {
            self.dropped_events += 1;
            warn!(error = %e, kind = ?event.kind(), "failed to record event");
        }
    }
}
