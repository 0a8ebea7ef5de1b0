use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::state::MatchSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidState,
    PermissionDenied,
    NotFound,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectReason::InvalidState => "invalid state",
            RejectReason::PermissionDenied => "permission denied",
            RejectReason::NotFound => "not found",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("snapshot not ready: {0}")]
    NotReady(String),
    #[error("snapshot fetch timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("snapshot rejected ({reason}): {detail}")]
    Rejected { reason: RejectReason, detail: String },
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::NotReady(_) | FetchError::Timeout | FetchError::Transport(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: FetchError },
    #[error("authoritative source refused: {0}")]
    Terminal(FetchError),
}

/// Where authoritative snapshots come from.
pub trait SnapshotSource {
    fn fetch(&mut self, match_id: &str) -> Result<MatchSnapshot, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Accepted { key: (u8, u64) },
    Stale { local: (u8, u64), remote: (u8, u64) },
}

/// Applies `incoming` over `view` when it is at least as new. Score and crease come from the
/// incoming snapshot; the last event shown never moves backwards.
pub fn merge_snapshot(view: &mut Option<MatchSnapshot>, mut incoming: MatchSnapshot) -> MergeOutcome {
    let remote = incoming.event_key();
    let Some(current) = view.as_ref() else {
        *view = Some(incoming);
        return MergeOutcome::Accepted { key: remote };
    };
    let local = current.event_key();
    if remote < local {
        return MergeOutcome::Stale { local, remote };
    }
    // The key already orders whole snapshots; this only matters for remote payloads that omit
    // `last_event`, which the engine never produces itself.
    let local_last = current.last_event.as_ref().map(|e| e.key());
    let remote_last = incoming.last_event.as_ref().map(|e| e.key());
    if local_last > remote_last {
        incoming.last_event = current.last_event.clone();
    }
    *view = Some(incoming);
    MergeOutcome::Accepted { key: remote }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Waiting,
    Synced { outcome: MergeOutcome },
    Retrying {
        attempt: u32,
        delay: Duration,
        error: FetchError,
    },
    Finished,
    Failed(SyncError),
}

/// What the polling loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Wait(Duration),
    Stop,
}

/// Merge bookkeeping and poll cadence, independent of threads and transport.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: SyncConfig,
    view: Option<MatchSnapshot>,
    failures: u32,
    status: SyncStatus,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            view: None,
            failures: 0,
            status: SyncStatus::Waiting,
        }
    }

    pub fn view(&self) -> Option<&MatchSnapshot> {
        self.view.as_ref()
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Folds in a locally applied effect. Uses the same rule as authoritative snapshots.
    pub fn record_local(&mut self, snapshot: MatchSnapshot) -> MergeOutcome {
        merge_snapshot(&mut self.view, snapshot)
    }

    pub fn cadence(&self) -> SyncStep {
        match self.view.as_ref() {
            Some(view) if view.is_final() => SyncStep::Stop,
            Some(view) if view.phase.is_live() => SyncStep::Wait(self.config.live_interval),
            _ => SyncStep::Wait(self.config.idle_interval),
        }
    }

    pub fn on_fetch(
        &mut self,
        result: Result<MatchSnapshot, FetchError>,
        rng: &mut impl RngCore,
    ) -> SyncStep {
        match result {
            Ok(snapshot) => {
                self.failures = 0;
                let outcome = merge_snapshot(&mut self.view, snapshot);
                match outcome {
                    MergeOutcome::Accepted { key } => debug!(?key, "snapshot accepted"),
                    MergeOutcome::Stale { local, remote } => {
                        info!(?local, ?remote, "stale snapshot dropped")
                    }
                }
                let step = self.cadence();
                self.status = match step {
                    SyncStep::Stop => SyncStatus::Finished,
                    SyncStep::Wait(_) => SyncStatus::Synced { outcome },
                };
                step
            }
            Err(error) if error.is_transient() => {
                self.failures += 1;
                let attempt = self.failures;
                if self.config.backoff.exhausted(attempt) {
                    warn!(attempts = attempt - 1, %error, "sync retries exhausted");
                    self.status = SyncStatus::Failed(SyncError::RetriesExhausted {
                        attempts: attempt - 1,
                        last: error,
                    });
                    return SyncStep::Stop;
                }
                let delay = self.config.backoff.jittered(rng, attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "snapshot not available, retrying");
                self.status = SyncStatus::Retrying {
                    attempt,
                    delay,
                    error,
                };
                SyncStep::Wait(delay)
            }
            Err(error) => {
                warn!(%error, "snapshot source refused, stopping sync");
                self.status = SyncStatus::Failed(SyncError::Terminal(error));
                SyncStep::Stop
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// A locally applied effect, so stale polls cannot roll it back.
    Local(Box<MatchSnapshot>),
    FetchNow,
    Stop,
}

#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub status: SyncStatus,
    pub view: Option<MatchSnapshot>,
}

/// Runs the reconciler on its own thread until the match is final, the source refuses, the
/// retries run out, or either channel closes.
pub fn spawn_sync<S>(
    mut source: S,
    match_id: String,
    config: SyncConfig,
    tx: Sender<SyncUpdate>,
    cmd_rx: Receiver<SyncCommand>,
) -> JoinHandle<()>
where
    S: SnapshotSource + Send + 'static,
{
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        let mut reconciler = Reconciler::new(config);
        let mut next_fetch = Instant::now();

        loop {
            let wait = next_fetch.saturating_duration_since(Instant::now());
            match cmd_rx.recv_timeout(wait) {
                Ok(SyncCommand::Local(snapshot)) => {
                    reconciler.record_local(*snapshot);
                    continue;
                }
                Ok(SyncCommand::FetchNow) | Err(RecvTimeoutError::Timeout) => {}
                Ok(SyncCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let result = source.fetch(&match_id);
            let step = reconciler.on_fetch(result, &mut rng);
            let update = SyncUpdate {
                status: reconciler.status().clone(),
                view: reconciler.view().cloned(),
            };
            if tx.send(update).is_err() {
                break;
            }
            match step {
                SyncStep::Wait(delay) => next_fetch = Instant::now() + delay,
                SyncStep::Stop => break,
            }
        }
        debug!(match_id = %match_id, "sync loop stopped");
    })
}
