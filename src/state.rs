use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run_rate;

pub type PlayerId = String;
pub type TeamId = String;

pub const MAX_WICKETS: u32 = 10;
pub const SUPER_OVER_OVERS: u32 = 1;
pub const SUPER_OVER_WICKETS: u32 = 2;
pub const PENALTY_RUNS: u32 = 1;
pub const MAX_RUNS_PER_BALL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    League,
    Knockout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub match_id: String,
    pub overs_per_innings: u32,
    pub balls_per_over: u32,
    pub stage: Stage,
}

impl MatchSettings {
    pub fn ball_limit(&self) -> u32 {
        self.overs_per_innings.saturating_mul(self.balls_per_over)
    }
}

/// Frozen playing XI for one side, as handed over by the roster service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSheet {
    pub team_id: TeamId,
    pub playing_xi: Vec<PlayerId>,
    #[serde(default)]
    pub captain: Option<PlayerId>,
    #[serde(default)]
    pub wicketkeeper: Option<PlayerId>,
}

impl TeamSheet {
    pub fn contains(&self, player: &str) -> bool {
        self.playing_xi.iter().any(|p| p == player)
    }

    /// Wickets that end an innings: ten, or one fewer than the side when it is short.
    pub fn wicket_cap(&self, ceiling: u32) -> u32 {
        let size = self.playing_xi.len() as u32;
        ceiling.min(size.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSetup {
    pub settings: MatchSettings,
    pub home: TeamSheet,
    pub away: TeamSheet,
}

impl MatchSetup {
    pub fn team(&self, team_id: &str) -> Option<&TeamSheet> {
        if self.home.team_id == team_id {
            Some(&self.home)
        } else if self.away.team_id == team_id {
            Some(&self.away)
        } else {
            None
        }
    }

    pub fn opponent(&self, team_id: &str) -> Option<&TeamSheet> {
        if self.home.team_id == team_id {
            Some(&self.away)
        } else if self.away.team_id == team_id {
            Some(&self.home)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InningsSlot {
    First,
    Second,
    SuperOverFirst,
    SuperOverSecond,
}

impl InningsSlot {
    pub fn ordinal(self) -> u8 {
        match self {
            InningsSlot::First => 1,
            InningsSlot::Second => 2,
            InningsSlot::SuperOverFirst => 3,
            InningsSlot::SuperOverSecond => 4,
        }
    }

    pub fn is_super_over(self) -> bool {
        matches!(self, InningsSlot::SuperOverFirst | InningsSlot::SuperOverSecond)
    }

    pub fn is_chase(self) -> bool {
        matches!(self, InningsSlot::Second | InningsSlot::SuperOverSecond)
    }

    pub fn code(self) -> &'static str {
        match self {
            InningsSlot::First => "1",
            InningsSlot::Second => "2",
            InningsSlot::SuperOverFirst => "so1",
            InningsSlot::SuperOverSecond => "so2",
        }
    }
}

impl fmt::Display for InningsSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InningsSlot::First => "1st innings",
            InningsSlot::Second => "2nd innings",
            InningsSlot::SuperOverFirst => "super over (1st)",
            InningsSlot::SuperOverSecond => "super over (2nd)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraType {
    Wide,
    NoBall,
    Bye,
    LegBye,
}

impl ExtraType {
    pub fn is_legal(self) -> bool {
        matches!(self, ExtraType::Bye | ExtraType::LegBye)
    }

    pub fn penalty(self) -> u32 {
        if self.is_legal() { 0 } else { PENALTY_RUNS }
    }

    /// Wides and no-balls go against the bowler; byes and leg-byes do not.
    pub fn charged_to_bowler(self) -> bool {
        !self.is_legal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WicketType {
    Bowled,
    Caught,
    Lbw,
    RunOut,
    Stumped,
    HitWicket,
}

impl WicketType {
    pub fn credited_to_bowler(self) -> bool {
        !matches!(self, WicketType::RunOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum End {
    Striker,
    NonStriker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crease {
    pub striker: PlayerId,
    pub non_striker: PlayerId,
    pub bowler: PlayerId,
}

impl Crease {
    pub fn swap_ends(&mut self) {
        std::mem::swap(&mut self.striker, &mut self.non_striker);
    }

    pub fn batter_at(&self, end: End) -> &PlayerId {
        match end {
            End::Striker => &self.striker,
            End::NonStriker => &self.non_striker,
        }
    }

    pub fn end_of(&self, player: &str) -> Option<End> {
        if self.striker == player {
            Some(End::Striker)
        } else if self.non_striker == player {
            Some(End::NonStriker)
        } else {
            None
        }
    }

    pub fn is_batting(&self, player: &str) -> bool {
        self.end_of(player).is_some()
    }

    pub fn replace_batter(&mut self, end: End, player: PlayerId) {
        match end {
            End::Striker => self.striker = player,
            End::NonStriker => self.non_striker = player,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WicketDetail {
    pub kind: WicketType,
    pub dismissed: PlayerId,
    #[serde(default)]
    pub fielder: Option<PlayerId>,
    pub bowler: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Run,
    Extra,
    Wicket,
    Swap,
    Retire,
    BowlerChange,
    Undo,
}

/// What a ledger entry did, kept in full so an innings can be rebuilt by replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Run {
        runs: u32,
    },
    Extra {
        extra: ExtraType,
        additional_runs: u32,
    },
    Wicket {
        kind: WicketType,
        runs_with_wicket: u32,
        dismissed_end: End,
        new_batter: Option<PlayerId>,
        fielder: Option<PlayerId>,
    },
    Swap,
    Retire {
        retiring: PlayerId,
        new_batter: PlayerId,
    },
    BowlerChange {
        bowler: PlayerId,
    },
    Undo {
        cancels: u64,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Run { .. } => EventKind::Run,
            EventPayload::Extra { .. } => EventKind::Extra,
            EventPayload::Wicket { .. } => EventKind::Wicket,
            EventPayload::Swap => EventKind::Swap,
            EventPayload::Retire { .. } => EventKind::Retire,
            EventPayload::BowlerChange { .. } => EventKind::BowlerChange,
            EventPayload::Undo { .. } => EventKind::Undo,
        }
    }

    /// Deliveries are the payloads that need a bowler in the middle of an over.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            EventPayload::Run { .. } | EventPayload::Extra { .. } | EventPayload::Wicket { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallEvent {
    pub sequence: u64,
    pub payload: EventPayload,
    pub runs: u32,
    pub legal: bool,
    #[serde(default)]
    pub extra: Option<ExtraType>,
    #[serde(default)]
    pub wicket: Option<WicketDetail>,
    pub crease: Crease,
    pub recorded_at: DateTime<Utc>,
}

impl BallEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: String,
    pub innings: InningsSlot,
    pub sequence: u64,
    pub kind: EventKind,
}

impl EventRef {
    pub fn key(&self) -> (u8, u64) {
        (self.innings.ordinal(), self.sequence)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrasBreakdown {
    pub wides: u32,
    pub no_balls: u32,
    pub byes: u32,
    pub leg_byes: u32,
}

impl ExtrasBreakdown {
    pub fn total(&self) -> u32 {
        self.wides + self.no_balls + self.byes + self.leg_byes
    }

    pub fn add(&mut self, extra: ExtraType, runs: u32) {
        match extra {
            ExtraType::Wide => self.wides += runs,
            ExtraType::NoBall => self.no_balls += runs,
            ExtraType::Bye => self.byes += runs,
            ExtraType::LegBye => self.leg_byes += runs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsTotals {
    pub runs: u32,
    pub wickets: u32,
    pub legal_balls: u32,
    pub extras: ExtrasBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    AllOut,
    OversComplete,
    TargetReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum InningsStatus {
    NotStarted,
    InProgress,
    Completed(CompletionReason),
}

impl InningsStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, InningsStatus::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatterFigures {
    pub player: PlayerId,
    pub runs: u32,
    pub balls: u32,
    pub fours: u32,
    pub sixes: u32,
    #[serde(default)]
    pub dismissal: Option<WicketDetail>,
    #[serde(default)]
    pub retired: bool,
}

impl BatterFigures {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            runs: 0,
            balls: 0,
            fours: 0,
            sixes: 0,
            dismissal: None,
            retired: false,
        }
    }

    pub fn strike_rate(&self) -> Option<f64> {
        if self.balls == 0 {
            return None;
        }
        Some(self.runs as f64 * 100.0 / self.balls as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlerFigures {
    pub player: PlayerId,
    pub legal_balls: u32,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub wides: u32,
    pub no_balls: u32,
    pub maidens: u32,
}

impl BowlerFigures {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            legal_balls: 0,
            runs_conceded: 0,
            wickets: 0,
            wides: 0,
            no_balls: 0,
            maidens: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallOfWicket {
    pub wicket: u32,
    pub runs: u32,
    pub legal_balls: u32,
    pub player: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InningsSnapshot {
    pub slot: InningsSlot,
    pub batting_team: TeamId,
    pub bowling_team: TeamId,
    pub status: InningsStatus,
    pub totals: InningsTotals,
    #[serde(default)]
    pub crease: Option<Crease>,
    #[serde(default)]
    pub target: Option<u32>,
    pub max_balls: u32,
    pub balls_per_over: u32,
    pub max_wickets: u32,
    pub awaiting_bowler_change: bool,
    #[serde(default)]
    pub batters: Vec<BatterFigures>,
    #[serde(default)]
    pub bowlers: Vec<BowlerFigures>,
    #[serde(default)]
    pub fall_of_wickets: Vec<FallOfWicket>,
    #[serde(default)]
    pub last_event: Option<EventRef>,
}

impl InningsSnapshot {
    pub fn overs(&self) -> String {
        run_rate::overs_notation(self.totals.legal_balls, self.balls_per_over)
    }

    pub fn current_run_rate(&self) -> f64 {
        run_rate::current_run_rate(self.totals.runs, self.totals.legal_balls, self.balls_per_over)
    }

    pub fn chase(&self) -> Option<ChaseContext> {
        let target = self.target?;
        Some(ChaseContext::derive(
            target,
            self.totals.runs,
            self.totals.legal_balls,
            self.max_balls,
            self.balls_per_over,
        ))
    }

    pub fn sequence(&self) -> u64 {
        self.last_event.as_ref().map(|e| e.sequence).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChaseContext {
    pub target_runs: u32,
    pub runs_remaining: u32,
    pub balls_remaining: u32,
    #[serde(default)]
    pub required_run_rate: Option<f64>,
}

impl ChaseContext {
    pub fn derive(
        target_runs: u32,
        runs: u32,
        legal_balls: u32,
        max_balls: u32,
        balls_per_over: u32,
    ) -> Self {
        let runs_remaining = target_runs.saturating_sub(runs);
        let balls_remaining = max_balls.saturating_sub(legal_balls);
        Self {
            target_runs,
            runs_remaining,
            balls_remaining,
            required_run_rate: run_rate::required_run_rate(
                runs_remaining,
                balls_remaining,
                balls_per_over,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Margin {
    Runs(u32),
    Wickets(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Win { winner: TeamId, margin: Margin },
    Tie,
    NoResult,
}

impl MatchResult {
    pub fn winner(&self) -> Option<&TeamId> {
        match self {
            MatchResult::Win { winner, .. } => Some(winner),
            _ => None,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Win { winner, margin } => match margin {
                Margin::Runs(n) => write!(f, "{winner} won by {n} run{}", plural(*n)),
                Margin::Wickets(n) => write!(f, "{winner} won by {n} wicket{}", plural(*n)),
            },
            MatchResult::Tie => f.write_str("match tied"),
            MatchResult::NoResult => f.write_str("no result"),
        }
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    AwaitingInnings1,
    Innings1,
    AwaitingInnings2,
    Innings2,
    ResultWin,
    ResultTie,
    ResultNoResult,
    SuperOverPending,
    SuperOverInProgress,
    SuperOverResult,
}

impl MatchPhase {
    /// Balls are being bowled (or about to be, mid super over).
    pub fn is_live(self) -> bool {
        matches!(
            self,
            MatchPhase::Innings1 | MatchPhase::Innings2 | MatchPhase::SuperOverInProgress
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub setup: MatchSetup,
    pub phase: MatchPhase,
    #[serde(default)]
    pub innings: Vec<InningsSnapshot>,
    #[serde(default)]
    pub chase: Option<ChaseContext>,
    #[serde(default)]
    pub result: Option<MatchResult>,
    #[serde(default)]
    pub super_over_result: Option<MatchResult>,
    #[serde(default)]
    pub tie_break_winner: Option<TeamId>,
    #[serde(default)]
    pub abandoned: Option<String>,
    #[serde(default)]
    pub last_event: Option<EventRef>,
}

impl MatchSnapshot {
    pub fn current(&self) -> Option<&InningsSnapshot> {
        self.innings.last()
    }

    pub fn innings(&self, slot: InningsSlot) -> Option<&InningsSnapshot> {
        self.innings.iter().find(|i| i.slot == slot)
    }

    /// Ordering key used to decide whether one view of the match is newer than another.
    pub fn event_key(&self) -> (u8, u64) {
        match self.current() {
            Some(innings) => (innings.slot.ordinal(), innings.sequence()),
            None => (0, 0),
        }
    }

    /// No further scoring or decisions can change this match.
    pub fn is_final(&self) -> bool {
        match self.phase {
            MatchPhase::ResultWin | MatchPhase::ResultNoResult | MatchPhase::ResultTie => true,
            MatchPhase::SuperOverResult => {
                self.tie_break_winner.is_some()
                    || matches!(self.super_over_result, Some(MatchResult::Win { .. }))
            }
            _ => false,
        }
    }

    /// Winner of the whole fixture, whichever stage decided it.
    pub fn winner(&self) -> Option<&TeamId> {
        if let Some(team) = self.tie_break_winner.as_ref() {
            return Some(team);
        }
        if let Some(team) = self.super_over_result.as_ref().and_then(|r| r.winner()) {
            return Some(team);
        }
        self.result.as_ref().and_then(|r| r.winner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Run {
        runs: u32,
    },
    Extra {
        extra: ExtraType,
        #[serde(default)]
        additional_runs: u32,
    },
    Wicket {
        kind: WicketType,
        #[serde(default)]
        runs_with_wicket: u32,
        #[serde(default)]
        new_batter: Option<PlayerId>,
        #[serde(default)]
        run_out_batsman: Option<End>,
        #[serde(default)]
        fielder: Option<PlayerId>,
    },
    Swap,
    Retire {
        retiring_batter: PlayerId,
        #[serde(default)]
        new_batter: Option<PlayerId>,
    },
    Undo,
    ChangeBowler {
        bowler: PlayerId,
    },
    StartFirstInnings {
        batting_team: TeamId,
        striker: PlayerId,
        non_striker: PlayerId,
        bowler: PlayerId,
    },
    StartSecondInnings {
        striker: PlayerId,
        non_striker: PlayerId,
        bowler: PlayerId,
    },
    StartSuperOver {
        striker: PlayerId,
        non_striker: PlayerId,
        bowler: PlayerId,
    },
    ResolveTie {
        winner: TeamId,
    },
    Abandon {
        reason: String,
    },
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Run { .. } => "run",
            Command::Extra { .. } => "extra",
            Command::Wicket { .. } => "wicket",
            Command::Swap => "swap",
            Command::Retire { .. } => "retire",
            Command::Undo => "undo",
            Command::ChangeBowler { .. } => "change_bowler",
            Command::StartFirstInnings { .. } => "start_first_innings",
            Command::StartSecondInnings { .. } => "start_second_innings",
            Command::StartSuperOver { .. } => "start_super_over",
            Command::ResolveTie { .. } => "resolve_tie",
            Command::Abandon { .. } => "abandon",
        }
    }
}

/// What a successful command hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEffect {
    #[serde(default)]
    pub innings: Option<InningsSnapshot>,
    pub phase: MatchPhase,
    #[serde(default)]
    pub last_event: Option<EventRef>,
}
