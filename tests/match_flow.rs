use crease_live::error::{CommandError, RosterIssue, UndoError};
use crease_live::processor::CommandProcessor;
use crease_live::state::{
    Command, End, InningsSlot, Margin, MatchPhase, MatchResult, MatchSettings, MatchSetup,
    MatchSnapshot, Stage, TeamSheet, WicketType,
};

fn sheet(team: &str) -> TeamSheet {
    TeamSheet {
        team_id: team.to_string(),
        playing_xi: (1..=11).map(|n| format!("{team}{n}")).collect(),
        captain: None,
        wicketkeeper: None,
    }
}

fn processor(overs: u32, stage: Stage) -> CommandProcessor {
    CommandProcessor::new(MatchSetup {
        settings: MatchSettings {
            match_id: "final".to_string(),
            overs_per_innings: overs,
            balls_per_over: 6,
            stage,
        },
        home: sheet("A"),
        away: sheet("B"),
    })
    .unwrap()
}

fn start(batting: &str, bowling: &str) -> (String, String, String) {
    (
        format!("{batting}1"),
        format!("{batting}2"),
        format!("{bowling}11"),
    )
}

fn start_first(p: &mut CommandProcessor) {
    let (striker, non_striker, bowler) = start("A", "B");
    p.submit(Command::StartFirstInnings {
        batting_team: "A".to_string(),
        striker,
        non_striker,
        bowler,
    })
    .unwrap();
}

fn start_second(p: &mut CommandProcessor) {
    let (striker, non_striker, bowler) = start("B", "A");
    p.submit(Command::StartSecondInnings {
        striker,
        non_striker,
        bowler,
    })
    .unwrap();
}

fn start_super_over(p: &mut CommandProcessor, batting: &str, bowling: &str) -> Result<(), CommandError> {
    let (striker, non_striker, bowler) = start(batting, bowling);
    p.submit(Command::StartSuperOver {
        striker,
        non_striker,
        bowler,
    })
    .map(|_| ())
}

/// Hands the next over to whichever of the two strike bowlers did not bowl the last one.
fn ensure_bowler(p: &mut CommandProcessor) {
    let snapshot = p.snapshot();
    let Some(current) = snapshot.current() else {
        return;
    };
    if !current.awaiting_bowler_change {
        return;
    }
    let last = current.crease.as_ref().map(|c| c.bowler.clone()).unwrap_or_default();
    let team = &current.bowling_team;
    let next = [format!("{team}10"), format!("{team}11")]
        .into_iter()
        .find(|b| *b != last)
        .unwrap();
    p.submit(Command::ChangeBowler { bowler: next }).unwrap();
}

fn deliver(p: &mut CommandProcessor, command: Command) {
    ensure_bowler(p);
    p.submit(command).unwrap();
}

fn runs(p: &mut CommandProcessor, each: u32, times: usize) {
    for _ in 0..times {
        deliver(p, Command::Run { runs: each });
    }
}

fn next_batter(snapshot: &MatchSnapshot) -> Option<String> {
    let current = snapshot.current()?;
    let team = snapshot.setup.team(&current.batting_team)?;
    team.playing_xi
        .iter()
        .find(|p| !current.batters.iter().any(|b| &b.player == *p))
        .cloned()
}

fn wickets(p: &mut CommandProcessor, times: usize) {
    for _ in 0..times {
        ensure_bowler(p);
        let new_batter = next_batter(&p.snapshot());
        p.submit(Command::Wicket {
            kind: WicketType::Bowled,
            runs_with_wicket: 0,
            new_batter,
            run_out_batsman: None,
            fielder: None,
        })
        .unwrap();
    }
}

/// Both sides make `score` off one over each.
fn tied_one_over_match(stage: Stage, score: u32) -> CommandProcessor {
    let mut p = processor(1, stage);
    start_first(&mut p);
    runs(&mut p, score, 1);
    runs(&mut p, 0, 5);
    start_second(&mut p);
    runs(&mut p, score, 1);
    runs(&mut p, 0, 5);
    p
}

#[test]
fn chase_of_151_completed_in_18_3_overs() {
    let mut p = processor(20, Stage::League);
    start_first(&mut p);
    wickets(&mut p, 6);
    runs(&mut p, 6, 25);
    runs(&mut p, 0, 89);
    let snapshot = p.snapshot();
    let first = snapshot.innings(InningsSlot::First).unwrap();
    assert_eq!((first.totals.runs, first.totals.wickets), (150, 6));
    assert_eq!(snapshot.phase, MatchPhase::AwaitingInnings2);

    start_second(&mut p);
    let chase = p.snapshot().chase.unwrap();
    assert_eq!(chase.target_runs, 151);
    assert_eq!(chase.balls_remaining, 120);

    wickets(&mut p, 4);
    runs(&mut p, 1, 1);
    runs(&mut p, 0, 81);
    runs(&mut p, 6, 24);
    assert_eq!(p.snapshot().phase, MatchPhase::Innings2);
    runs(&mut p, 6, 1);

    let snapshot = p.snapshot();
    let second = snapshot.current().unwrap();
    assert_eq!((second.totals.runs, second.totals.wickets), (151, 4));
    assert_eq!(second.overs(), "18.3");
    assert_eq!(snapshot.phase, MatchPhase::ResultWin);
    assert_eq!(
        snapshot.result,
        Some(MatchResult::Win {
            winner: "B".to_string(),
            margin: Margin::Wickets(6),
        })
    );
    assert!(snapshot.is_final());
    assert!(matches!(p.submit(Command::Run { runs: 1 }), Err(CommandError::InvalidState(_))));
}

#[test]
fn defending_side_wins_by_runs() {
    let mut p = processor(2, Stage::League);
    start_first(&mut p);
    runs(&mut p, 4, 3);
    runs(&mut p, 0, 9);
    start_second(&mut p);
    runs(&mut p, 1, 5);
    runs(&mut p, 0, 7);
    let snapshot = p.snapshot();
    assert_eq!(
        snapshot.result,
        Some(MatchResult::Win {
            winner: "A".to_string(),
            margin: Margin::Runs(7),
        })
    );
    assert_eq!(snapshot.result.unwrap().to_string(), "A won by 7 runs");
}

#[test]
fn league_tie_is_final_and_has_no_tie_break() {
    let mut p = tied_one_over_match(Stage::League, 6);
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::ResultTie);
    assert_eq!(snapshot.result, Some(MatchResult::Tie));
    assert!(snapshot.is_final());
    assert!(matches!(
        p.submit(Command::ResolveTie {
            winner: "A".to_string()
        }),
        Err(CommandError::TieBreakNotAllowed(_))
    ));
    assert_eq!(start_super_over(&mut p, "B", "A"), Err(CommandError::TieBreakNotApplicable));
}

#[test]
fn super_over_only_after_a_knockout_tie() {
    let mut p = processor(1, Stage::Knockout);
    start_first(&mut p);
    assert_eq!(start_super_over(&mut p, "A", "B"), Err(CommandError::TieBreakNotApplicable));
}

#[test]
fn knockout_tie_goes_to_super_over_then_adjudication() {
    let mut p = tied_one_over_match(Stage::Knockout, 4);
    assert_eq!(p.snapshot().phase, MatchPhase::SuperOverPending);
    assert_eq!(
        p.submit(Command::ResolveTie {
            winner: "A".to_string()
        }),
        Err(CommandError::SuperOverPending)
    );

    // The side that chased bats first.
    start_super_over(&mut p, "B", "A").unwrap();
    let snapshot = p.snapshot();
    let so1 = snapshot.current().unwrap();
    assert_eq!(so1.slot, InningsSlot::SuperOverFirst);
    assert_eq!(so1.batting_team, "B");
    assert_eq!(so1.max_wickets, 2);
    assert_eq!(so1.max_balls, 6);
    assert_eq!(snapshot.phase, MatchPhase::SuperOverInProgress);
    assert_eq!(start_super_over(&mut p, "A", "B"), Err(CommandError::SuperOverAlreadyStarted));
    assert_eq!(
        p.submit(Command::ResolveTie {
            winner: "A".to_string()
        }),
        Err(CommandError::SuperOverPending)
    );

    runs(&mut p, 6, 1);
    wickets(&mut p, 2);
    let snapshot = p.snapshot();
    assert!(snapshot.current().unwrap().status.is_complete());
    assert_eq!(snapshot.phase, MatchPhase::SuperOverInProgress);

    start_super_over(&mut p, "A", "B").unwrap();
    assert_eq!(p.snapshot().chase.unwrap().target_runs, 7);
    runs(&mut p, 3, 2);
    runs(&mut p, 0, 4);

    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::SuperOverResult);
    assert_eq!(snapshot.super_over_result, Some(MatchResult::Tie));
    assert!(!snapshot.is_final());

    assert!(matches!(
        p.submit(Command::ResolveTie {
            winner: "C".to_string()
        }),
        Err(CommandError::RosterInvalid(RosterIssue::UnknownTeam { .. }))
    ));
    p.submit(Command::ResolveTie {
        winner: "A".to_string(),
    })
    .unwrap();
    let snapshot = p.snapshot();
    assert!(snapshot.is_final());
    assert_eq!(snapshot.winner(), Some(&"A".to_string()));
    assert!(matches!(
        p.submit(Command::ResolveTie {
            winner: "B".to_string()
        }),
        Err(CommandError::InvalidState(_))
    ));
    assert!(matches!(
        p.submit(Command::Undo),
        Err(CommandError::Undo(UndoError::InningsClosed(_)))
    ));
}

#[test]
fn super_over_winner_needs_no_adjudication() {
    let mut p = tied_one_over_match(Stage::Knockout, 2);
    start_super_over(&mut p, "B", "A").unwrap();
    runs(&mut p, 1, 1);
    runs(&mut p, 0, 5);
    start_super_over(&mut p, "A", "B").unwrap();
    runs(&mut p, 2, 1);

    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::SuperOverResult);
    assert_eq!(
        snapshot.super_over_result,
        Some(MatchResult::Win {
            winner: "A".to_string(),
            margin: Margin::Wickets(2),
        })
    );
    assert!(snapshot.is_final());
    assert_eq!(snapshot.winner(), Some(&"A".to_string()));
    assert!(matches!(
        p.submit(Command::ResolveTie {
            winner: "B".to_string()
        }),
        Err(CommandError::TieBreakNotAllowed(_))
    ));
}

#[test]
fn abandonment_is_a_no_result() {
    let mut p = processor(20, Stage::League);
    start_first(&mut p);
    runs(&mut p, 1, 3);
    p.submit(Command::Abandon {
        reason: "rain".to_string(),
    })
    .unwrap();
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::ResultNoResult);
    assert_eq!(snapshot.result, Some(MatchResult::NoResult));
    assert_eq!(snapshot.abandoned.as_deref(), Some("rain"));
    assert!(matches!(p.submit(Command::Run { runs: 1 }), Err(CommandError::InvalidState(_))));
    assert!(matches!(
        p.submit(Command::Abandon {
            reason: "again".to_string()
        }),
        Err(CommandError::InvalidState(_))
    ));
    assert!(matches!(
        p.submit(Command::Undo),
        Err(CommandError::Undo(UndoError::InningsClosed(_)))
    ));
}

#[test]
fn abandoned_super_over_leaves_the_tie_to_the_adjudicator() {
    let mut p = tied_one_over_match(Stage::Knockout, 1);
    start_super_over(&mut p, "B", "A").unwrap();
    p.submit(Command::Abandon {
        reason: "bad light".to_string(),
    })
    .unwrap();
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::SuperOverResult);
    assert_eq!(snapshot.super_over_result, Some(MatchResult::NoResult));
    p.submit(Command::ResolveTie {
        winner: "B".to_string(),
    })
    .unwrap();
    assert_eq!(p.snapshot().winner(), Some(&"B".to_string()));
}

#[test]
fn phase_order_is_enforced() {
    let mut p = processor(1, Stage::League);
    let (striker, non_striker, bowler) = start("B", "A");
    assert!(matches!(
        p.submit(Command::StartSecondInnings {
            striker: striker.clone(),
            non_striker: non_striker.clone(),
            bowler: bowler.clone(),
        }),
        Err(CommandError::InvalidState(_))
    ));
    assert!(matches!(
        p.submit(Command::StartFirstInnings {
            batting_team: "Z".to_string(),
            striker: "Z1".to_string(),
            non_striker: "Z2".to_string(),
            bowler: "A11".to_string(),
        }),
        Err(CommandError::RosterInvalid(RosterIssue::UnknownTeam { .. }))
    ));
    assert!(matches!(p.submit(Command::Run { runs: 1 }), Err(CommandError::InvalidState(_))));
    start_first(&mut p);
    assert!(matches!(
        p.submit(Command::StartSecondInnings {
            striker,
            non_striker,
            bowler,
        }),
        Err(CommandError::InvalidState(_))
    ));
}

#[test]
fn undoing_the_completing_ball_reopens_the_innings() {
    let mut p = processor(1, Stage::League);
    start_first(&mut p);
    runs(&mut p, 0, 6);
    assert_eq!(p.snapshot().phase, MatchPhase::AwaitingInnings2);

    p.submit(Command::Undo).unwrap();
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::Innings1);
    assert_eq!(snapshot.current().unwrap().totals.legal_balls, 5);

    runs(&mut p, 4, 1);
    start_second(&mut p);
    assert_eq!(p.snapshot().chase.unwrap().target_runs, 5);
}

#[test]
fn undoing_the_winning_hit_reopens_the_chase() {
    let mut p = processor(1, Stage::League);
    start_first(&mut p);
    runs(&mut p, 1, 5);
    runs(&mut p, 0, 1);
    start_second(&mut p);
    runs(&mut p, 6, 1);
    assert_eq!(p.snapshot().phase, MatchPhase::ResultWin);

    p.submit(Command::Undo).unwrap();
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::Innings2);
    assert!(snapshot.result.is_none());
    let chase = snapshot.chase.unwrap();
    assert_eq!((chase.target_runs, chase.runs_remaining, chase.balls_remaining), (6, 6, 6));
}

#[test]
fn undo_cannot_reach_back_into_a_finished_innings() {
    let mut p = processor(1, Stage::League);
    start_first(&mut p);
    runs(&mut p, 1, 6);
    start_second(&mut p);
    assert!(matches!(
        p.submit(Command::Undo),
        Err(CommandError::Undo(UndoError::InningsClosed(_)))
    ));
    assert_eq!(p.snapshot().innings(InningsSlot::First).unwrap().totals.runs, 6);

    runs(&mut p, 2, 1);
    p.submit(Command::Undo).unwrap();
    assert_eq!(
        p.submit(Command::Undo),
        Err(CommandError::Undo(UndoError::ConsecutiveUndo))
    );
}

#[test]
fn winning_run_beats_a_run_out_attempt() {
    let mut p = processor(20, Stage::League);
    start_first(&mut p);
    runs(&mut p, 1, 4);
    wickets(&mut p, 10);
    start_second(&mut p);
    wickets(&mut p, 9);
    runs(&mut p, 2, 2);
    ensure_bowler(&mut p);
    p.submit(Command::Wicket {
        kind: WicketType::RunOut,
        runs_with_wicket: 1,
        new_batter: None,
        run_out_batsman: Some(End::NonStriker),
        fielder: None,
    })
    .unwrap();

    let snapshot = p.snapshot();
    let chase = snapshot.current().unwrap();
    assert_eq!((chase.totals.runs, chase.totals.wickets), (5, 9));
    assert_eq!(chase.fall_of_wickets.len(), 9);
    assert_eq!(
        snapshot.result,
        Some(MatchResult::Win {
            winner: "B".to_string(),
            margin: Margin::Wickets(1),
        })
    );
    let last = p.ledger(InningsSlot::Second).unwrap().last().unwrap();
    assert!(last.wicket.is_none());
    assert!(p.state().current_innings().unwrap().verify_replay());
}

#[test]
fn target_is_reached_mid_over() {
    let mut p = processor(20, Stage::League);
    start_first(&mut p);
    runs(&mut p, 4, 1);
    runs(&mut p, 0, 119);
    start_second(&mut p);
    runs(&mut p, 2, 1);
    runs(&mut p, 3, 1);
    let snapshot = p.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::ResultWin);
    assert_eq!(snapshot.current().unwrap().overs(), "0.2");
    assert_eq!(snapshot.winner(), Some(&"B".to_string()));
}
