use std::collections::HashSet;

use tracing::debug;

use crate::error::{CommandError, Result, UndoError};
use crate::ledger::{Entry, Ledger};
use crate::over_tracker::{self, BallOutcome, DeliveryKind};
use crate::state::{
    BallEvent, BatterFigures, BowlerFigures, CompletionReason, Crease, End, EventPayload, EventRef,
    ExtraType, FallOfWicket, InningsSlot, InningsSnapshot, InningsStatus, InningsTotals,
    MAX_RUNS_PER_BALL, PlayerId, TeamId, TeamSheet, WicketDetail, WicketType,
};
use crate::validator::RosterValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InningsLimits {
    pub max_balls: u32,
    pub balls_per_over: u32,
    pub max_wickets: u32,
}

/// Everything a replay reconstructs. Two equal values mean two identical innings states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InningsProgress {
    pub status: InningsStatus,
    pub totals: InningsTotals,
    pub crease: Option<Crease>,
    pub batters: Vec<BatterFigures>,
    pub bowlers: Vec<BowlerFigures>,
    pub fall_of_wickets: Vec<FallOfWicket>,
    pub previous_over_bowler: Option<PlayerId>,
    pub awaiting_bowler_change: bool,
    pub over_runs: u32,
}

impl InningsProgress {
    fn not_started() -> Self {
        Self {
            status: InningsStatus::NotStarted,
            totals: InningsTotals::default(),
            crease: None,
            batters: Vec::new(),
            bowlers: Vec::new(),
            fall_of_wickets: Vec::new(),
            previous_over_bowler: None,
            awaiting_bowler_change: false,
            over_runs: 0,
        }
    }

    fn opening(crease: Crease) -> Self {
        let mut progress = Self::not_started();
        progress.status = InningsStatus::InProgress;
        progress.batters = vec![
            BatterFigures::new(crease.striker.clone()),
            BatterFigures::new(crease.non_striker.clone()),
        ];
        progress.bowlers = vec![BowlerFigures::new(crease.bowler.clone())];
        progress.crease = Some(crease);
        progress
    }

    fn batter_mut(&mut self, player: &str) -> &mut BatterFigures {
        let idx = match self.batters.iter().position(|b| b.player == player) {
            Some(idx) => idx,
            None => {
                self.batters.push(BatterFigures::new(player.to_string()));
                self.batters.len() - 1
            }
        };
        &mut self.batters[idx]
    }

    fn bowler_mut(&mut self, player: &str) -> &mut BowlerFigures {
        let idx = match self.bowlers.iter().position(|b| b.player == player) {
            Some(idx) => idx,
            None => {
                self.bowlers.push(BowlerFigures::new(player.to_string()));
                self.bowlers.len() - 1
            }
        };
        &mut self.bowlers[idx]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WicketCall {
    pub kind: WicketType,
    pub runs_with_wicket: u32,
    pub new_batter: Option<PlayerId>,
    pub run_out_batsman: Option<End>,
    pub fielder: Option<PlayerId>,
}

#[derive(Debug, Default)]
struct Applied {
    runs: u32,
    legal: bool,
    extra: Option<ExtraType>,
    wicket: Option<WicketDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Innings {
    slot: InningsSlot,
    batting: TeamSheet,
    bowling: TeamSheet,
    limits: InningsLimits,
    target: Option<u32>,
    opening: Option<Crease>,
    progress: InningsProgress,
    ledger: Ledger,
}

impl Innings {
    pub fn new(
        slot: InningsSlot,
        batting: TeamSheet,
        bowling: TeamSheet,
        limits: InningsLimits,
        target: Option<u32>,
    ) -> Self {
        Self {
            slot,
            batting,
            bowling,
            limits,
            target,
            opening: None,
            progress: InningsProgress::not_started(),
            ledger: Ledger::new(),
        }
    }

    pub fn slot(&self) -> InningsSlot {
        self.slot
    }

    pub fn batting_team(&self) -> &TeamId {
        &self.batting.team_id
    }

    pub fn bowling_team(&self) -> &TeamId {
        &self.bowling.team_id
    }

    pub fn limits(&self) -> InningsLimits {
        self.limits
    }

    pub fn target(&self) -> Option<u32> {
        self.target
    }

    pub fn status(&self) -> InningsStatus {
        self.progress.status
    }

    pub fn is_complete(&self) -> bool {
        self.progress.status.is_complete()
    }

    pub fn totals(&self) -> &InningsTotals {
        &self.progress.totals
    }

    pub fn crease(&self) -> Option<&Crease> {
        self.progress.crease.as_ref()
    }

    pub fn progress(&self) -> &InningsProgress {
        &self.progress
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn awaiting_bowler_change(&self) -> bool {
        self.progress.awaiting_bowler_change
    }

    fn validator(&self) -> RosterValidator<'_> {
        RosterValidator::new(&self.batting, &self.bowling)
    }

    pub fn start(&mut self, striker: PlayerId, non_striker: PlayerId, bowler: PlayerId) -> Result<()> {
        if self.progress.status != InningsStatus::NotStarted {
            return Err(CommandError::invalid_state(format!("{} has already started", self.slot)));
        }
        self.validator().check_opening(&striker, &non_striker, &bowler)?;
        self.opening = Some(Crease {
            striker,
            non_striker,
            bowler,
        });
        self.rebuild();
        debug!(innings = %self.slot, batting = %self.batting.team_id, "innings started");
        Ok(())
    }

    pub fn apply_run(&mut self, runs: u32) -> Result<&BallEvent> {
        self.record(EventPayload::Run { runs })
    }

    pub fn apply_extra(&mut self, extra: ExtraType, additional_runs: u32) -> Result<&BallEvent> {
        self.record(EventPayload::Extra {
            extra,
            additional_runs,
        })
    }

    pub fn apply_wicket(&mut self, call: WicketCall) -> Result<&BallEvent> {
        self.ensure_accepting(true)?;
        let dismissed_end = if call.kind == WicketType::RunOut {
            self.validator().run_out_end(call.run_out_batsman)?
        } else {
            if call.runs_with_wicket > 0 {
                return Err(CommandError::InvalidRuns {
                    runs: call.runs_with_wicket,
                });
            }
            End::Striker
        };
        self.record(EventPayload::Wicket {
            kind: call.kind,
            runs_with_wicket: call.runs_with_wicket,
            dismissed_end,
            new_batter: call.new_batter,
            fielder: call.fielder,
        })
    }

    pub fn swap_strike(&mut self) -> Result<&BallEvent> {
        self.record(EventPayload::Swap)
    }

    pub fn retire(&mut self, retiring: PlayerId, new_batter: Option<PlayerId>) -> Result<&BallEvent> {
        self.ensure_accepting(false)?;
        let Some(new_batter) = new_batter else {
            return Err(CommandError::NewBatterRequired);
        };
        self.record(EventPayload::Retire {
            retiring,
            new_batter,
        })
    }

    pub fn change_bowler(&mut self, bowler: PlayerId) -> Result<&BallEvent> {
        self.record(EventPayload::BowlerChange { bowler })
    }

    /// Cancels the most recent effective event and rebuilds the innings from its opening.
    /// Works on a completed innings too: the completing event is always the last one.
    pub fn undo(&mut self) -> Result<&BallEvent> {
        if self.progress.status == InningsStatus::NotStarted {
            return Err(UndoError::NothingToUndo.into());
        }
        if self.ledger.last().is_some_and(|e| matches!(e.payload, EventPayload::Undo { .. })) {
            return Err(UndoError::ConsecutiveUndo.into());
        }
        let Some(target) = self.ledger.last_effective().map(|e| e.sequence) else {
            return Err(UndoError::NothingToUndo.into());
        };
        let before = self.live_crease()?.clone();

        let mut cancelled = self.ledger.cancelled();
        cancelled.insert(target);
        self.replay(&cancelled);

        let crease = self.progress.crease.clone().unwrap_or(before);
        let event = self.ledger.append(Entry {
            payload: EventPayload::Undo { cancels: target },
            runs: 0,
            legal: false,
            extra: None,
            wicket: None,
            crease,
        });
        debug!(innings = %self.slot, sequence = event.sequence, cancels = target, "undo recorded");
        Ok(event)
    }

    /// Recomputes the whole innings from the ledger.
    pub fn rebuild(&mut self) {
        let cancelled = self.ledger.cancelled();
        self.replay(&cancelled);
    }

    /// True when replaying the ledger reproduces the live state exactly.
    pub fn verify_replay(&self) -> bool {
        let mut copy = self.clone();
        copy.rebuild();
        copy.progress == self.progress
    }

    fn replay(&mut self, cancelled: &HashSet<u64>) {
        let Some(opening) = self.opening.clone() else {
            self.progress = InningsProgress::not_started();
            return;
        };
        self.progress = InningsProgress::opening(opening);
        let payloads: Vec<EventPayload> = self
            .ledger
            .events()
            .iter()
            .filter(|e| !matches!(e.payload, EventPayload::Undo { .. }))
            .filter(|e| !cancelled.contains(&e.sequence))
            .map(|e| e.payload.clone())
            .collect();
        for payload in &payloads {
            self.apply_payload(payload);
        }
    }

    fn live_crease(&self) -> Result<&Crease> {
        self.progress
            .crease
            .as_ref()
            .ok_or_else(|| CommandError::invalid_state(format!("{} has not started", self.slot)))
    }

    fn ensure_accepting(&self, delivery: bool) -> Result<()> {
        match self.progress.status {
            InningsStatus::NotStarted => Err(CommandError::invalid_state(format!(
                "{} has not started",
                self.slot
            ))),
            InningsStatus::Completed(CompletionReason::AllOut) => Err(CommandError::AllOut),
            InningsStatus::Completed(CompletionReason::OversComplete) => {
                Err(CommandError::OversExhausted)
            }
            InningsStatus::Completed(CompletionReason::TargetReached) => {
                Err(CommandError::invalid_state("target already reached"))
            }
            InningsStatus::InProgress if delivery && self.progress.awaiting_bowler_change => {
                Err(CommandError::OverBoundaryPending {
                    over: self.progress.totals.legal_balls / self.limits.balls_per_over.max(1),
                })
            }
            InningsStatus::InProgress => Ok(()),
        }
    }

    fn wicket_completes(&self, runs_with_wicket: u32) -> bool {
        let totals = &self.progress.totals;
        totals.wickets + 1 >= self.limits.max_wickets
            || totals.legal_balls + 1 >= self.limits.max_balls
            || self
                .target
                .is_some_and(|target| totals.runs + runs_with_wicket >= target)
    }

    fn validate(&self, payload: &EventPayload) -> Result<()> {
        let crease = self.live_crease()?;
        let validator = self.validator();
        match payload {
            EventPayload::Run { runs } => {
                if *runs > MAX_RUNS_PER_BALL {
                    return Err(CommandError::InvalidRuns { runs: *runs });
                }
            }
            EventPayload::Extra {
                extra,
                additional_runs,
            } => {
                let needs_runs = extra.is_legal() && *additional_runs == 0;
                if *additional_runs > MAX_RUNS_PER_BALL || needs_runs {
                    return Err(CommandError::InvalidRuns {
                        runs: *additional_runs,
                    });
                }
            }
            EventPayload::Wicket {
                runs_with_wicket,
                new_batter,
                fielder,
                ..
            } => {
                if *runs_with_wicket > MAX_RUNS_PER_BALL {
                    return Err(CommandError::InvalidRuns {
                        runs: *runs_with_wicket,
                    });
                }
                validator.check_fielder(fielder.as_deref())?;
                if !self.wicket_completes(*runs_with_wicket) {
                    let Some(new_batter) = new_batter else {
                        return Err(CommandError::NewBatterRequired);
                    };
                    validator.check_new_batter(new_batter, crease, &self.progress.batters)?;
                }
            }
            EventPayload::Swap => {}
            EventPayload::Retire {
                retiring,
                new_batter,
            } => {
                validator.retiring_end(retiring, crease)?;
                validator.check_new_batter(new_batter, crease, &self.progress.batters)?;
            }
            EventPayload::BowlerChange { bowler } => {
                validator.check_bowler_change(
                    bowler,
                    crease,
                    self.progress.previous_over_bowler.as_deref(),
                    !self.progress.awaiting_bowler_change,
                )?;
            }
            EventPayload::Undo { .. } => {
                return Err(CommandError::invalid_state("undo is not a scoring event"));
            }
        }
        Ok(())
    }

    fn record(&mut self, payload: EventPayload) -> Result<&BallEvent> {
        self.ensure_accepting(payload.is_delivery())?;
        self.validate(&payload)?;
        let before = self.live_crease()?.clone();

        let applied = self.apply_payload(&payload);
        let crease = self.progress.crease.clone().unwrap_or(before);
        let event = self.ledger.append(Entry {
            payload,
            runs: applied.runs,
            legal: applied.legal,
            extra: applied.extra,
            wicket: applied.wicket,
            crease,
        });
        debug!(
            innings = %self.slot,
            sequence = event.sequence,
            kind = ?event.kind(),
            runs = event.runs,
            "event recorded"
        );
        Ok(event)
    }

    /// Applies an already-validated payload. Infallible so replay cannot stop halfway.
    fn apply_payload(&mut self, payload: &EventPayload) -> Applied {
        let Some(crease) = self.progress.crease.clone() else {
            return Applied::default();
        };
        match payload {
            EventPayload::Run { runs } => self.apply_run_payload(&crease, *runs),
            EventPayload::Extra {
                extra,
                additional_runs,
            } => self.apply_extra_payload(&crease, *extra, *additional_runs),
            EventPayload::Wicket {
                kind,
                runs_with_wicket,
                dismissed_end,
                new_batter,
                fielder,
            } => self.apply_wicket_payload(
                &crease,
                *kind,
                *runs_with_wicket,
                *dismissed_end,
                new_batter.as_ref(),
                fielder.as_ref(),
            ),
            EventPayload::Swap => {
                self.swap_ends();
                Applied::default()
            }
            EventPayload::Retire {
                retiring,
                new_batter,
            } => {
                if let Some(end) = crease.end_of(retiring) {
                    self.progress.batter_mut(retiring).retired = true;
                    self.progress.batter_mut(new_batter).retired = false;
                    if let Some(live) = self.progress.crease.as_mut() {
                        live.replace_batter(end, new_batter.clone());
                    }
                }
                Applied::default()
            }
            EventPayload::BowlerChange { bowler } => {
                self.progress.awaiting_bowler_change = false;
                self.progress.bowler_mut(bowler);
                if let Some(live) = self.progress.crease.as_mut() {
                    live.bowler = bowler.clone();
                }
                Applied::default()
            }
            EventPayload::Undo { .. } => Applied::default(),
        }
    }

    fn apply_run_payload(&mut self, crease: &Crease, runs: u32) -> Applied {
        let ball = self.bowl(crease, DeliveryKind::Run);
        let batter = self.progress.batter_mut(&crease.striker);
        batter.runs += runs;
        batter.balls += 1;
        match runs {
            4 => batter.fours += 1,
            6 => batter.sixes += 1,
            _ => {}
        }
        self.concede(crease, runs, runs);
        if runs % 2 == 1 {
            self.swap_ends();
        }
        self.settle_status(ball);
        self.close_over(ball);
        Applied {
            runs,
            legal: true,
            extra: None,
            wicket: None,
        }
    }

    fn apply_extra_payload(&mut self, crease: &Crease, extra: ExtraType, additional_runs: u32) -> Applied {
        let total = extra.penalty() + additional_runs;
        let ball = self.bowl(crease, DeliveryKind::Extra(extra));
        self.progress.totals.extras.add(extra, total);
        if extra != ExtraType::Wide {
            self.progress.batter_mut(&crease.striker).balls += 1;
        }
        let bowler = self.progress.bowler_mut(&crease.bowler);
        match extra {
            ExtraType::Wide => bowler.wides += 1,
            ExtraType::NoBall => bowler.no_balls += 1,
            ExtraType::Bye | ExtraType::LegBye => {}
        }
        let charged = if extra.charged_to_bowler() { total } else { 0 };
        self.concede(crease, total, charged);
        // Only runs actually run move the batters; the penalty run never does.
        if additional_runs % 2 == 1 {
            self.swap_ends();
        }
        self.settle_status(ball);
        self.close_over(ball);
        Applied {
            runs: total,
            legal: ball.legal,
            extra: Some(extra),
            wicket: None,
        }
    }

    fn apply_wicket_payload(
        &mut self,
        crease: &Crease,
        kind: WicketType,
        runs: u32,
        dismissed_end: End,
        new_batter: Option<&PlayerId>,
        fielder: Option<&PlayerId>,
    ) -> Applied {
        let ball = self.bowl(crease, DeliveryKind::Wicket);
        let dismissed = crease.batter_at(dismissed_end).clone();
        let striker = self.progress.batter_mut(&crease.striker);
        striker.balls += 1;
        striker.runs += runs;
        self.concede(crease, runs, runs);
        if runs % 2 == 1 {
            self.swap_ends();
        }

        // The winning run kills the ball; the attempted run out never happened.
        if self
            .target
            .is_some_and(|target| self.progress.totals.runs >= target)
        {
            self.settle_status(ball);
            self.close_over(ball);
            return Applied {
                runs,
                legal: true,
                extra: None,
                wicket: None,
            };
        }

        let detail = WicketDetail {
            kind,
            dismissed: dismissed.clone(),
            fielder: fielder.cloned(),
            bowler: crease.bowler.clone(),
        };
        self.progress.totals.wickets += 1;
        self.progress.batter_mut(&dismissed).dismissal = Some(detail.clone());
        if kind.credited_to_bowler() {
            self.progress.bowler_mut(&crease.bowler).wickets += 1;
        }
        let totals = self.progress.totals;
        self.progress.fall_of_wickets.push(FallOfWicket {
            wicket: totals.wickets,
            runs: totals.runs,
            legal_balls: totals.legal_balls,
            player: dismissed.clone(),
        });

        self.settle_status(ball);
        if self.progress.status == InningsStatus::InProgress
            && let Some(new_batter) = new_batter
        {
            self.progress.batter_mut(new_batter).retired = false;
            if let Some(live) = self.progress.crease.as_mut()
                && let Some(end) = live.end_of(&dismissed)
            {
                live.replace_batter(end, new_batter.clone());
            }
        }
        self.close_over(ball);
        Applied {
            runs,
            legal: true,
            extra: None,
            wicket: Some(detail),
        }
    }

    fn bowl(&mut self, crease: &Crease, kind: DeliveryKind) -> BallOutcome {
        let ball = over_tracker::track(
            self.progress.totals.legal_balls,
            self.limits.balls_per_over,
            self.limits.max_balls,
            kind,
        );
        self.progress.totals.legal_balls = ball.legal_balls;
        if ball.legal {
            self.progress.bowler_mut(&crease.bowler).legal_balls += 1;
        }
        ball
    }

    fn concede(&mut self, crease: &Crease, team_runs: u32, bowler_runs: u32) {
        self.progress.totals.runs += team_runs;
        self.progress.bowler_mut(&crease.bowler).runs_conceded += bowler_runs;
        self.progress.over_runs += bowler_runs;
    }

    fn swap_ends(&mut self) {
        if let Some(live) = self.progress.crease.as_mut() {
            live.swap_ends();
        }
    }

    fn settle_status(&mut self, ball: BallOutcome) {
        let totals = &self.progress.totals;
        let reason = if self.target.is_some_and(|target| totals.runs >= target) {
            Some(CompletionReason::TargetReached)
        } else if totals.wickets >= self.limits.max_wickets {
            Some(CompletionReason::AllOut)
        } else if ball.innings_exhausted {
            Some(CompletionReason::OversComplete)
        } else {
            None
        };
        if let Some(reason) = reason {
            self.progress.status = InningsStatus::Completed(reason);
        }
    }

    fn close_over(&mut self, ball: BallOutcome) {
        if ball.ends_over {
            if self.progress.over_runs == 0
                && let Some(bowler) = self.progress.crease.as_ref().map(|c| c.bowler.clone())
            {
                self.progress.bowler_mut(&bowler).maidens += 1;
            }
            self.progress.over_runs = 0;
        }
        if ball.over_boundary && self.progress.status == InningsStatus::InProgress {
            self.progress.previous_over_bowler =
                self.progress.crease.as_ref().map(|c| c.bowler.clone());
            self.progress.awaiting_bowler_change = true;
            self.swap_ends();
        }
    }

    pub fn last_event_ref(&self, match_id: &str) -> Option<EventRef> {
        self.ledger.last().map(|event| EventRef {
            id: format!("{match_id}:{}:{}", self.slot.code(), event.sequence),
            innings: self.slot,
            sequence: event.sequence,
            kind: event.kind(),
        })
    }

    pub fn snapshot(&self, match_id: &str) -> InningsSnapshot {
        InningsSnapshot {
            slot: self.slot,
            batting_team: self.batting.team_id.clone(),
            bowling_team: self.bowling.team_id.clone(),
            status: self.progress.status,
            totals: self.progress.totals,
            crease: self.progress.crease.clone(),
            target: self.target,
            max_balls: self.limits.max_balls,
            balls_per_over: self.limits.balls_per_over,
            max_wickets: self.limits.max_wickets,
            awaiting_bowler_change: self.progress.awaiting_bowler_change,
            batters: self.progress.batters.clone(),
            bowlers: self.progress.bowlers.clone(),
            fall_of_wickets: self.progress.fall_of_wickets.clone(),
            last_event: self.last_event_ref(match_id),
        }
    }
}
