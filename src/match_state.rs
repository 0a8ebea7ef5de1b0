use std::collections::HashSet;

use tracing::info;

use crate::error::{CommandError, Result, RosterIssue, UndoError};
use crate::innings::{Innings, InningsLimits, WicketCall};
use crate::ledger::Ledger;
use crate::state::{
    AppliedEffect, Command, InningsSlot, MAX_WICKETS, Margin, MatchPhase, MatchResult, MatchSetup,
    MatchSnapshot, PlayerId, SUPER_OVER_OVERS, SUPER_OVER_WICKETS, Stage, TeamId, TeamSheet,
};

/// Sequences the innings of one fixture and owns its result.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    setup: MatchSetup,
    phase: MatchPhase,
    innings: Vec<Innings>,
    result: Option<MatchResult>,
    super_over_result: Option<MatchResult>,
    tie_break_winner: Option<TeamId>,
    abandoned: Option<String>,
}

impl MatchState {
    pub fn new(setup: MatchSetup) -> Result<Self> {
        validate_setup(&setup)?;
        Ok(Self {
            setup,
            phase: MatchPhase::AwaitingInnings1,
            innings: Vec::new(),
            result: None,
            super_over_result: None,
            tie_break_winner: None,
            abandoned: None,
        })
    }

    pub fn setup(&self) -> &MatchSetup {
        &self.setup
    }

    pub fn match_id(&self) -> &str {
        &self.setup.settings.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn super_over_result(&self) -> Option<&MatchResult> {
        self.super_over_result.as_ref()
    }

    pub fn tie_break_winner(&self) -> Option<&TeamId> {
        self.tie_break_winner.as_ref()
    }

    pub fn current_innings(&self) -> Option<&Innings> {
        self.innings.last()
    }

    pub fn innings(&self, slot: InningsSlot) -> Option<&Innings> {
        self.innings.iter().find(|i| i.slot() == slot)
    }

    pub fn all_innings(&self) -> &[Innings] {
        &self.innings
    }

    pub fn ledger(&self, slot: InningsSlot) -> Option<&Ledger> {
        self.innings(slot).map(|i| i.ledger())
    }

    pub fn is_final(&self) -> bool {
        match self.phase {
            MatchPhase::ResultWin | MatchPhase::ResultTie | MatchPhase::ResultNoResult => true,
            MatchPhase::SuperOverResult => {
                self.tie_break_winner.is_some()
                    || matches!(self.super_over_result, Some(MatchResult::Win { .. }))
            }
            _ => false,
        }
    }

    pub fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Run { runs } => {
                self.scoring_innings()?.apply_run(*runs)?;
            }
            Command::Extra {
                extra,
                additional_runs,
            } => {
                self.scoring_innings()?.apply_extra(*extra, *additional_runs)?;
            }
            Command::Wicket {
                kind,
                runs_with_wicket,
                new_batter,
                run_out_batsman,
                fielder,
            } => {
                let call = WicketCall {
                    kind: *kind,
                    runs_with_wicket: *runs_with_wicket,
                    new_batter: new_batter.clone(),
                    run_out_batsman: *run_out_batsman,
                    fielder: fielder.clone(),
                };
                self.scoring_innings()?.apply_wicket(call)?;
            }
            Command::Swap => {
                self.scoring_innings()?.swap_strike()?;
            }
            Command::Retire {
                retiring_batter,
                new_batter,
            } => {
                self.scoring_innings()?
                    .retire(retiring_batter.clone(), new_batter.clone())?;
            }
            Command::ChangeBowler { bowler } => {
                self.scoring_innings()?.change_bowler(bowler.clone())?;
            }
            Command::Undo => self.undo()?,
            Command::StartFirstInnings {
                batting_team,
                striker,
                non_striker,
                bowler,
            } => self.start_first_innings(batting_team, striker, non_striker, bowler)?,
            Command::StartSecondInnings {
                striker,
                non_striker,
                bowler,
            } => self.start_second_innings(striker, non_striker, bowler)?,
            Command::StartSuperOver {
                striker,
                non_striker,
                bowler,
            } => self.start_super_over(striker, non_striker, bowler)?,
            Command::ResolveTie { winner } => self.resolve_tie(winner)?,
            Command::Abandon { reason } => self.abandon(reason)?,
        }
        self.reevaluate();
        Ok(())
    }

    fn scoring_innings(&mut self) -> Result<&mut Innings> {
        if self.abandoned.is_some() {
            return Err(CommandError::invalid_state("match abandoned"));
        }
        if self.tie_break_winner.is_some() {
            return Err(CommandError::invalid_state("match already decided"));
        }
        self.innings
            .last_mut()
            .ok_or_else(|| CommandError::invalid_state("no innings has started"))
    }

    fn undo(&mut self) -> Result<()> {
        if self.abandoned.is_some() {
            return Err(UndoError::InningsClosed("match abandoned".to_string()).into());
        }
        if self.tie_break_winner.is_some() {
            return Err(UndoError::InningsClosed("tie-break decided".to_string()).into());
        }
        let earlier = self.innings.len() > 1;
        let Some(innings) = self.innings.last_mut() else {
            return Err(UndoError::NothingToUndo.into());
        };
        let slot = innings.slot();
        match innings.undo().map(|_| ()) {
            // Only the earlier innings has anything left to correct, and it is closed.
            Err(CommandError::Undo(UndoError::NothingToUndo)) if earlier => {
                Err(UndoError::InningsClosed(format!("{slot} has started")).into())
            }
            other => other,
        }
    }

    fn start_first_innings(
        &mut self,
        batting_team: &str,
        striker: &PlayerId,
        non_striker: &PlayerId,
        bowler: &PlayerId,
    ) -> Result<()> {
        if self.phase != MatchPhase::AwaitingInnings1 {
            return Err(CommandError::invalid_state(format!(
                "cannot start the first innings during {:?}",
                self.phase
            )));
        }
        let batting = self
            .setup
            .team(batting_team)
            .cloned()
            .ok_or_else(|| RosterIssue::UnknownTeam {
                team: batting_team.to_string(),
            })?;
        let bowling = self.opponent_of(&batting)?;
        let limits = self.regular_limits(&batting);
        self.open_innings(InningsSlot::First, batting, bowling, limits, None, striker, non_striker, bowler)
    }

    fn start_second_innings(&mut self, striker: &PlayerId, non_striker: &PlayerId, bowler: &PlayerId) -> Result<()> {
        if self.phase != MatchPhase::AwaitingInnings2 {
            return Err(CommandError::invalid_state(format!(
                "cannot start the second innings during {:?}",
                self.phase
            )));
        }
        let Some(first) = self.innings(InningsSlot::First) else {
            return Err(CommandError::invalid_state("first innings missing"));
        };
        let target = first.totals().runs + 1;
        let batting = self.sheet(first.bowling_team())?;
        let bowling = self.opponent_of(&batting)?;
        let limits = self.regular_limits(&batting);
        self.open_innings(
            InningsSlot::Second,
            batting,
            bowling,
            limits,
            Some(target),
            striker,
            non_striker,
            bowler,
        )
    }

    fn start_super_over(&mut self, striker: &PlayerId, non_striker: &PlayerId, bowler: &PlayerId) -> Result<()> {
        let (slot, batting_team, target) = match self.phase {
            MatchPhase::SuperOverPending => {
                // The side that chased bats first in the super over.
                let Some(second) = self.innings(InningsSlot::Second) else {
                    return Err(CommandError::invalid_state("second innings missing"));
                };
                (InningsSlot::SuperOverFirst, second.batting_team().clone(), None)
            }
            MatchPhase::SuperOverInProgress => match self.current_innings() {
                Some(so1) if so1.slot() == InningsSlot::SuperOverFirst && so1.is_complete() => (
                    InningsSlot::SuperOverSecond,
                    so1.bowling_team().clone(),
                    Some(so1.totals().runs + 1),
                ),
                _ => return Err(CommandError::SuperOverAlreadyStarted),
            },
            MatchPhase::SuperOverResult => return Err(CommandError::SuperOverAlreadyStarted),
            _ => return Err(CommandError::TieBreakNotApplicable),
        };
        let batting = self.sheet(&batting_team)?;
        let bowling = self.opponent_of(&batting)?;
        let limits = InningsLimits {
            max_balls: SUPER_OVER_OVERS * self.setup.settings.balls_per_over,
            balls_per_over: self.setup.settings.balls_per_over,
            max_wickets: batting.wicket_cap(SUPER_OVER_WICKETS),
        };
        self.open_innings(slot, batting, bowling, limits, target, striker, non_striker, bowler)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_innings(
        &mut self,
        slot: InningsSlot,
        batting: TeamSheet,
        bowling: TeamSheet,
        limits: InningsLimits,
        target: Option<u32>,
        striker: &PlayerId,
        non_striker: &PlayerId,
        bowler: &PlayerId,
    ) -> Result<()> {
        let mut innings = Innings::new(slot, batting, bowling, limits, target);
        innings.start(striker.clone(), non_striker.clone(), bowler.clone())?;
        self.innings.push(innings);
        Ok(())
    }

    fn resolve_tie(&mut self, winner: &str) -> Result<()> {
        if self.setup.settings.stage != Stage::Knockout {
            return Err(CommandError::TieBreakNotAllowed(
                "league matches stay tied".to_string(),
            ));
        }
        if self.result != Some(MatchResult::Tie) {
            return Err(CommandError::TieBreakNotAllowed("match is not tied".to_string()));
        }
        match self.phase {
            MatchPhase::SuperOverPending | MatchPhase::SuperOverInProgress => {
                return Err(CommandError::SuperOverPending);
            }
            MatchPhase::SuperOverResult => {}
            _ => {
                return Err(CommandError::TieBreakNotAllowed(format!(
                    "no tie-break during {:?}",
                    self.phase
                )));
            }
        }
        if matches!(self.super_over_result, Some(MatchResult::Win { .. })) {
            return Err(CommandError::TieBreakNotAllowed(
                "super over produced a winner".to_string(),
            ));
        }
        if self.tie_break_winner.is_some() {
            return Err(CommandError::invalid_state("tie-break already decided"));
        }
        if self.setup.team(winner).is_none() {
            return Err(RosterIssue::UnknownTeam {
                team: winner.to_string(),
            }
            .into());
        }
        self.tie_break_winner = Some(winner.to_string());
        info!(match_id = %self.match_id(), winner, "tie resolved by adjudicator");
        Ok(())
    }

    fn abandon(&mut self, reason: &str) -> Result<()> {
        let closed = matches!(
            self.phase,
            MatchPhase::ResultWin
                | MatchPhase::ResultTie
                | MatchPhase::ResultNoResult
                | MatchPhase::SuperOverResult
        );
        if closed || self.abandoned.is_some() {
            return Err(CommandError::invalid_state("match already decided"));
        }
        self.abandoned = Some(reason.to_string());
        Ok(())
    }

    /// Re-derives phase and results from the innings. Undo relies on this being a pure function
    /// of the innings, so nothing here is sticky except the adjudicator's decision.
    fn reevaluate(&mut self) {
        let previous = self.phase;
        let (phase, result, super_over_result) = self.derive();
        self.phase = phase;
        self.result = result;
        self.super_over_result = super_over_result;
        if previous != phase {
            info!(
                match_id = %self.match_id(),
                from = ?previous,
                to = ?phase,
                "match phase changed"
            );
        }
    }

    fn derive(&self) -> (MatchPhase, Option<MatchResult>, Option<MatchResult>) {
        let no_result = (MatchPhase::ResultNoResult, Some(MatchResult::NoResult), None);
        let abandoned = self.abandoned.is_some();

        let Some(first) = self.innings(InningsSlot::First) else {
            return if abandoned { no_result } else { (MatchPhase::AwaitingInnings1, None, None) };
        };
        let Some(second) = self.innings(InningsSlot::Second) else {
            if abandoned {
                return no_result;
            }
            let phase = if first.is_complete() {
                MatchPhase::AwaitingInnings2
            } else {
                MatchPhase::Innings1
            };
            return (phase, None, None);
        };
        if !second.is_complete() {
            return if abandoned { no_result } else { (MatchPhase::Innings2, None, None) };
        }

        let result = decide(first, second);
        if result != MatchResult::Tie {
            return (MatchPhase::ResultWin, Some(result), None);
        }
        if self.setup.settings.stage == Stage::League {
            return (MatchPhase::ResultTie, Some(MatchResult::Tie), None);
        }

        let so1 = self.innings(InningsSlot::SuperOverFirst);
        let so2 = self.innings(InningsSlot::SuperOverSecond);
        if let (Some(a), Some(b)) = (so1, so2)
            && b.is_complete()
        {
            return (MatchPhase::SuperOverResult, Some(MatchResult::Tie), Some(decide(a, b)));
        }
        if abandoned {
            return (
                MatchPhase::SuperOverResult,
                Some(MatchResult::Tie),
                Some(MatchResult::NoResult),
            );
        }
        let phase = if so1.is_some() {
            MatchPhase::SuperOverInProgress
        } else {
            MatchPhase::SuperOverPending
        };
        (phase, Some(MatchResult::Tie), None)
    }

    fn regular_limits(&self, batting: &TeamSheet) -> InningsLimits {
        InningsLimits {
            max_balls: self.setup.settings.ball_limit(),
            balls_per_over: self.setup.settings.balls_per_over,
            max_wickets: batting.wicket_cap(MAX_WICKETS),
        }
    }

    fn sheet(&self, team: &str) -> Result<TeamSheet> {
        self.setup.team(team).cloned().ok_or_else(|| {
            RosterIssue::UnknownTeam {
                team: team.to_string(),
            }
            .into()
        })
    }

    fn opponent_of(&self, batting: &TeamSheet) -> Result<TeamSheet> {
        self.setup
            .opponent(&batting.team_id)
            .cloned()
            .ok_or_else(|| {
                RosterIssue::UnknownTeam {
                    team: batting.team_id.clone(),
                }
                .into()
            })
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        let match_id = self.match_id();
        let innings: Vec<_> = self.innings.iter().map(|i| i.snapshot(match_id)).collect();
        let chase = innings
            .last()
            .filter(|i| i.slot.is_chase())
            .and_then(|i| i.chase());
        let last_event = innings.last().and_then(|i| i.last_event.clone());
        MatchSnapshot {
            setup: self.setup.clone(),
            phase: self.phase,
            innings,
            chase,
            result: self.result.clone(),
            super_over_result: self.super_over_result.clone(),
            tie_break_winner: self.tie_break_winner.clone(),
            abandoned: self.abandoned.clone(),
            last_event,
        }
    }

    pub fn effect(&self) -> AppliedEffect {
        let match_id = self.match_id();
        let innings = self.current_innings().map(|i| i.snapshot(match_id));
        AppliedEffect {
            last_event: innings.as_ref().and_then(|i| i.last_event.clone()),
            innings,
            phase: self.phase,
        }
    }
}

/// Result of a completed chase. `chasing` carries the target set by `defending`.
fn decide(defending: &Innings, chasing: &Innings) -> MatchResult {
    let target = chasing
        .target()
        .unwrap_or(defending.totals().runs + 1);
    let totals = chasing.totals();
    if totals.runs >= target {
        let wickets_left = chasing.limits().max_wickets.saturating_sub(totals.wickets);
        MatchResult::Win {
            winner: chasing.batting_team().clone(),
            margin: Margin::Wickets(wickets_left),
        }
    } else if totals.runs + 1 == target {
        MatchResult::Tie
    } else {
        MatchResult::Win {
            winner: defending.batting_team().clone(),
            margin: Margin::Runs(target - 1 - totals.runs),
        }
    }
}

fn validate_setup(setup: &MatchSetup) -> Result<()> {
    let settings = &setup.settings;
    if settings.overs_per_innings == 0 || settings.balls_per_over == 0 {
        return Err(CommandError::invalid_state("overs and balls per over must be positive"));
    }
    if setup.home.team_id == setup.away.team_id {
        return Err(CommandError::invalid_state("a team cannot play itself"));
    }
    for sheet in [&setup.home, &setup.away] {
        if sheet.playing_xi.len() < 2 {
            return Err(CommandError::invalid_state(format!(
                "{} needs at least two players",
                sheet.team_id
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = sheet.playing_xi.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(RosterIssue::DuplicateAssignment { player: dup.clone() }.into());
        }
    }
    Ok(())
}
