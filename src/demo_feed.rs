use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::error::CommandError;
use crate::processor::CommandProcessor;
use crate::reconcile::{FetchError, RejectReason, SnapshotSource};
use crate::state::{
    Command, End, ExtraType, InningsSlot, MatchPhase, MatchSettings, MatchSetup, MatchSnapshot,
    PlayerId, Stage, TeamSheet, WicketType,
};

const HOME: (&str, [&str; 11]) = (
    "IND",
    [
        "Rohit", "Gill", "Kohli", "Pant", "Surya", "Hardik", "Jadeja", "Axar", "Kuldeep", "Bumrah",
        "Siraj",
    ],
);
const AWAY: (&str, [&str; 11]) = (
    "AUS",
    [
        "Head", "Warner", "Marsh", "Smith", "Maxwell", "Stoinis", "Wade", "Cummins", "Starc",
        "Zampa", "Hazlewood",
    ],
);

pub fn demo_setup() -> MatchSetup {
    demo_setup_with("demo-t20", 20, Stage::Knockout)
}

pub fn demo_setup_with(match_id: &str, overs: u32, stage: Stage) -> MatchSetup {
    MatchSetup {
        settings: MatchSettings {
            match_id: match_id.to_string(),
            overs_per_innings: overs,
            balls_per_over: 6,
            stage,
        },
        home: sheet(HOME.0, &HOME.1),
        away: sheet(AWAY.0, &AWAY.1),
    }
}

fn sheet(team: &str, players: &[&str]) -> TeamSheet {
    TeamSheet {
        team_id: team.to_string(),
        playing_xi: players.iter().map(|p| p.to_string()).collect(),
        captain: players.first().map(|p| p.to_string()),
        wicketkeeper: players.get(3).map(|p| p.to_string()),
    }
}

/// Picks a legal next command for the match, or `None` once nothing is left to do.
pub fn next_demo_command(rng: &mut impl Rng, snapshot: &MatchSnapshot) -> Option<Command> {
    let setup = &snapshot.setup;
    match snapshot.phase {
        MatchPhase::AwaitingInnings1 => {
            let (striker, non_striker) = openers(&setup.home);
            Some(Command::StartFirstInnings {
                batting_team: setup.home.team_id.clone(),
                striker,
                non_striker,
                bowler: opening_bowler(&setup.away),
            })
        }
        MatchPhase::AwaitingInnings2 => {
            let first = snapshot.innings(InningsSlot::First)?;
            let batting = setup.team(&first.bowling_team)?;
            let bowling = setup.opponent(&batting.team_id)?;
            let (striker, non_striker) = openers(batting);
            Some(Command::StartSecondInnings {
                striker,
                non_striker,
                bowler: opening_bowler(bowling),
            })
        }
        MatchPhase::SuperOverPending => {
            let second = snapshot.innings(InningsSlot::Second)?;
            super_over_start(snapshot, &second.batting_team)
        }
        MatchPhase::Innings1 | MatchPhase::Innings2 | MatchPhase::SuperOverInProgress => {
            let current = snapshot.current()?;
            if current.status.is_complete() {
                // First super over done; the other side bats next.
                return super_over_start(snapshot, &current.bowling_team);
            }
            Some(next_delivery(rng, snapshot))
        }
        MatchPhase::SuperOverResult if !snapshot.is_final() => Some(Command::ResolveTie {
            winner: setup.home.team_id.clone(),
        }),
        _ => None,
    }
}

fn openers(batting: &TeamSheet) -> (PlayerId, PlayerId) {
    (batting.playing_xi[0].clone(), batting.playing_xi[1].clone())
}

fn opening_bowler(bowling: &TeamSheet) -> PlayerId {
    bowling.playing_xi[bowling.playing_xi.len() - 1].clone()
}

fn super_over_start(snapshot: &MatchSnapshot, batting_team: &str) -> Option<Command> {
    let batting = snapshot.setup.team(batting_team)?;
    let bowling = snapshot.setup.opponent(batting_team)?;
    let (striker, non_striker) = openers(batting);
    Some(Command::StartSuperOver {
        striker,
        non_striker,
        bowler: opening_bowler(bowling),
    })
}

fn next_delivery(rng: &mut impl Rng, snapshot: &MatchSnapshot) -> Command {
    let Some(current) = snapshot.current() else {
        return Command::Run { runs: 0 };
    };
    let setup = &snapshot.setup;
    let bowling = setup.team(&current.bowling_team).unwrap_or(&setup.away);
    let batting = setup.team(&current.batting_team).unwrap_or(&setup.home);
    let crease = current.crease.as_ref();

    if current.awaiting_bowler_change {
        let last = crease.map(|c| c.bowler.as_str()).unwrap_or_default();
        // The bottom five of the order do the bowling.
        let pool: Vec<&PlayerId> = bowling
            .playing_xi
            .iter()
            .rev()
            .take(5)
            .filter(|p| p.as_str() != last)
            .collect();
        let bowler = pool[rng.gen_range(0..pool.len())].clone();
        return Command::ChangeBowler { bowler };
    }

    let roll = rng.gen_range(0..100);
    match roll {
        0..=3 => Command::Extra {
            extra: ExtraType::Wide,
            additional_runs: u32::from(rng.gen_bool(0.1)),
        },
        4..=5 => Command::Extra {
            extra: ExtraType::NoBall,
            additional_runs: 0,
        },
        6..=7 => Command::Extra {
            extra: if rng.gen_bool(0.5) {
                ExtraType::Bye
            } else {
                ExtraType::LegBye
            },
            additional_runs: 1,
        },
        8..=12 => {
            let new_batter = batting
                .playing_xi
                .iter()
                .find(|p| !current.batters.iter().any(|b| &b.player == *p))
                .cloned();
            let kind = match rng.gen_range(0..4) {
                0 => WicketType::Bowled,
                1 => WicketType::Caught,
                2 => WicketType::Lbw,
                _ => WicketType::RunOut,
            };
            let run_out = kind == WicketType::RunOut;
            let fielder = matches!(kind, WicketType::Caught | WicketType::RunOut)
                .then(|| bowling.playing_xi[rng.gen_range(0..bowling.playing_xi.len())].clone());
            Command::Wicket {
                kind,
                runs_with_wicket: if run_out { rng.gen_range(0..=1) } else { 0 },
                new_batter,
                run_out_batsman: run_out.then(|| {
                    if rng.gen_bool(0.7) {
                        End::NonStriker
                    } else {
                        End::Striker
                    }
                }),
                fielder,
            }
        }
        13..=45 => Command::Run { runs: 0 },
        46..=77 => Command::Run { runs: 1 },
        78..=86 => Command::Run { runs: 2 },
        87 => Command::Run { runs: 3 },
        88..=95 => Command::Run { runs: 4 },
        _ => Command::Run { runs: 6 },
    }
}

/// Drives a processor with demo commands until the match is final. Returns how many commands
/// were applied.
pub fn play_to_completion(
    processor: &mut CommandProcessor,
    rng: &mut impl Rng,
    max_commands: usize,
) -> Result<usize, CommandError> {
    let mut applied = 0;
    while applied < max_commands {
        let snapshot = processor.snapshot();
        let Some(command) = next_demo_command(rng, &snapshot) else {
            break;
        };
        processor.submit(command)?;
        applied += 1;
    }
    Ok(applied)
}

/// An in-process authoritative source that scores a few deliveries per poll and now and then
/// reports that it is mid-transition.
pub struct DemoSource {
    processor: CommandProcessor,
    rng: StdRng,
    not_ready_rate: f64,
    steps_per_fetch: usize,
}

impl DemoSource {
    pub fn new(setup: MatchSetup, seed: u64) -> Result<Self, CommandError> {
        Ok(Self {
            processor: CommandProcessor::new(setup)?,
            rng: StdRng::seed_from_u64(seed),
            not_ready_rate: 0.1,
            steps_per_fetch: 3,
        })
    }

    pub fn with_not_ready_rate(mut self, rate: f64) -> Self {
        self.not_ready_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_steps_per_fetch(mut self, steps: usize) -> Self {
        self.steps_per_fetch = steps.max(1);
        self
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }
}

impl SnapshotSource for DemoSource {
    fn fetch(&mut self, match_id: &str) -> Result<MatchSnapshot, FetchError> {
        if match_id != self.processor.state().match_id() {
            return Err(FetchError::Rejected {
                reason: RejectReason::NotFound,
                detail: format!("unknown match {match_id}"),
            });
        }
        if self.rng.gen_bool(self.not_ready_rate) {
            return Err(FetchError::NotReady("scorer is mid-transition".to_string()));
        }
        for _ in 0..self.steps_per_fetch {
            let snapshot = self.processor.snapshot();
            let Some(command) = next_demo_command(&mut self.rng, &snapshot) else {
                break;
            };
            if let Err(err) = self.processor.submit(command) {
                warn!(%err, "demo command rejected");
                break;
            }
        }
        Ok(self.processor.snapshot())
    }
}
