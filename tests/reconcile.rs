use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crease_live::backoff::BackoffPolicy;
use crease_live::config::SyncConfig;
use crease_live::demo_feed::{DemoSource, demo_setup_with};
use crease_live::processor::CommandProcessor;
use crease_live::reconcile::{
    FetchError, MergeOutcome, Reconciler, RejectReason, SnapshotSource, SyncCommand, SyncError,
    SyncStatus, SyncStep, merge_snapshot, spawn_sync,
};
use crease_live::snapshot_fetch::parse_snapshot_json;
use crease_live::state::{Command, MatchSnapshot, Stage};

fn config(max_attempts: u32) -> SyncConfig {
    SyncConfig {
        live_interval: Duration::from_millis(20),
        idle_interval: Duration::from_millis(50),
        backoff: BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(40),
            max_attempts,
        },
        snapshot_url: None,
        http_timeout: Duration::from_secs(1),
    }
}

/// Snapshots of one match taken after 0, 1, 2, ... deliveries.
fn timeline(deliveries: usize) -> Vec<MatchSnapshot> {
    let mut p = CommandProcessor::new(demo_setup_with("sync", 20, Stage::League)).unwrap();
    p.submit(Command::StartFirstInnings {
        batting_team: "IND".to_string(),
        striker: "Rohit".to_string(),
        non_striker: "Gill".to_string(),
        bowler: "Hazlewood".to_string(),
    })
    .unwrap();
    let mut out = vec![p.snapshot()];
    for n in 0..deliveries {
        p.submit(Command::Run { runs: (n % 3) as u32 }).unwrap();
        out.push(p.snapshot());
    }
    out
}

struct Scripted(VecDeque<Result<MatchSnapshot, FetchError>>);

impl SnapshotSource for Scripted {
    fn fetch(&mut self, _match_id: &str) -> Result<MatchSnapshot, FetchError> {
        self.0
            .pop_front()
            .unwrap_or(Err(FetchError::NotReady("script exhausted".to_string())))
    }
}

#[test]
fn older_snapshots_never_replace_newer_state() {
    let snaps = timeline(4);
    let mut view = None;
    assert_eq!(
        merge_snapshot(&mut view, snaps[3].clone()),
        MergeOutcome::Accepted { key: (1, 3) }
    );
    assert_eq!(
        merge_snapshot(&mut view, snaps[1].clone()),
        MergeOutcome::Stale {
            local: (1, 3),
            remote: (1, 1)
        }
    );
    assert_eq!(view.as_ref(), Some(&snaps[3]));
    // Same key is accepted: the authoritative copy wins ties.
    assert!(matches!(
        merge_snapshot(&mut view, snaps[3].clone()),
        MergeOutcome::Accepted { .. }
    ));
    assert!(matches!(
        merge_snapshot(&mut view, snaps[4].clone()),
        MergeOutcome::Accepted { key: (1, 4) }
    ));
}

#[test]
fn last_event_survives_a_payload_without_one() {
    let snaps = timeline(2);
    let mut view = Some(snaps[2].clone());
    let mut raw = serde_json::to_value(&snaps[2]).unwrap();
    raw.as_object_mut().unwrap().remove("last_event");
    let remote = parse_snapshot_json(&raw.to_string()).unwrap();
    assert!(remote.last_event.is_none());

    assert_eq!(
        merge_snapshot(&mut view, remote),
        MergeOutcome::Accepted { key: (1, 2) }
    );
    assert_eq!(view.unwrap().last_event, snaps[2].last_event);
}

#[test]
fn local_effects_outrank_stale_polls() {
    let snaps = timeline(3);
    let mut rng = StdRng::seed_from_u64(1);
    let mut reconciler = Reconciler::new(config(3));
    reconciler.record_local(snaps[3].clone());
    let step = reconciler.on_fetch(Ok(snaps[2].clone()), &mut rng);
    assert_eq!(step, SyncStep::Wait(Duration::from_millis(20)));
    assert!(matches!(
        reconciler.status(),
        SyncStatus::Synced {
            outcome: MergeOutcome::Stale { .. }
        }
    ));
    assert_eq!(reconciler.view(), Some(&snaps[3]));
}

#[test]
fn transient_failures_back_off_then_recover() {
    let snaps = timeline(1);
    let mut rng = StdRng::seed_from_u64(9);
    let mut reconciler = Reconciler::new(config(5));

    let step = reconciler.on_fetch(Err(FetchError::NotReady("changeover".to_string())), &mut rng);
    let SyncStep::Wait(first) = step else {
        panic!("expected a retry, got {step:?}");
    };
    assert!(first >= Duration::from_millis(5) && first <= Duration::from_millis(10));
    assert!(matches!(reconciler.status(), SyncStatus::Retrying { attempt: 1, .. }));

    let step = reconciler.on_fetch(Err(FetchError::Timeout), &mut rng);
    let SyncStep::Wait(second) = step else {
        panic!("expected a retry, got {step:?}");
    };
    assert!(second >= Duration::from_millis(10) && second <= Duration::from_millis(20));

    reconciler.on_fetch(Ok(snaps[1].clone()), &mut rng);
    assert!(matches!(reconciler.status(), SyncStatus::Synced { .. }));

    // The failure count starts over after a success.
    reconciler.on_fetch(Err(FetchError::Timeout), &mut rng);
    assert!(matches!(reconciler.status(), SyncStatus::Retrying { attempt: 1, .. }));
}

#[test]
fn retries_are_bounded() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut reconciler = Reconciler::new(config(3));
    for _ in 0..3 {
        assert!(matches!(
            reconciler.on_fetch(Err(FetchError::Timeout), &mut rng),
            SyncStep::Wait(_)
        ));
    }
    assert_eq!(reconciler.on_fetch(Err(FetchError::Timeout), &mut rng), SyncStep::Stop);
    assert_eq!(
        reconciler.status(),
        &SyncStatus::Failed(SyncError::RetriesExhausted {
            attempts: 3,
            last: FetchError::Timeout
        })
    );
}

#[test]
fn rejections_stop_immediately() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut reconciler = Reconciler::new(config(5));
    let rejected = FetchError::Rejected {
        reason: RejectReason::PermissionDenied,
        detail: "scorer token expired".to_string(),
    };
    assert_eq!(reconciler.on_fetch(Err(rejected.clone()), &mut rng), SyncStep::Stop);
    assert_eq!(reconciler.status(), &SyncStatus::Failed(SyncError::Terminal(rejected)));
    assert!(!FetchError::Malformed("eof".to_string()).is_transient());
}

#[test]
fn cadence_follows_the_match_phase() {
    let mut reconciler = Reconciler::new(config(3));
    assert_eq!(reconciler.cadence(), SyncStep::Wait(Duration::from_millis(50)));
    reconciler.record_local(timeline(0).remove(0));
    assert_eq!(reconciler.cadence(), SyncStep::Wait(Duration::from_millis(20)));
}

#[test]
fn sync_thread_runs_a_demo_match_to_completion() {
    let setup = demo_setup_with("demo-sync", 2, Stage::League);
    let source = DemoSource::new(setup, 11)
        .unwrap()
        .with_not_ready_rate(0.0)
        .with_steps_per_fetch(10_000);
    let (tx, rx) = mpsc::channel();
    let (_cmd_tx, cmd_rx) = mpsc::channel();
    let worker = spawn_sync(source, "demo-sync".to_string(), config(3), tx, cmd_rx);

    let updates: Vec<_> = rx.iter().collect();
    worker.join().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.status, SyncStatus::Finished);
    assert!(last.view.as_ref().unwrap().is_final());
}

#[test]
fn sync_thread_stops_on_request() {
    let source = Scripted(VecDeque::new());
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let worker = spawn_sync(source, "m".to_string(), config(1_000), tx, cmd_rx);
    let first = rx.recv().unwrap();
    assert!(matches!(first.status, SyncStatus::Retrying { .. }));
    cmd_tx.send(SyncCommand::Stop).unwrap();
    worker.join().unwrap();
}

#[test]
fn unknown_match_is_rejected_by_the_demo_source() {
    let mut source = DemoSource::new(demo_setup_with("known", 2, Stage::League), 1)
        .unwrap()
        .with_not_ready_rate(0.0);
    assert!(matches!(
        source.fetch("unknown"),
        Err(FetchError::Rejected {
            reason: RejectReason::NotFound,
            ..
        })
    ));
    let snapshot = source.fetch("known").unwrap();
    assert!(!snapshot.innings.is_empty());
}
