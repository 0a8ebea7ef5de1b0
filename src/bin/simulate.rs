use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crease_live::demo_feed::{demo_setup_with, play_to_completion};
use crease_live::processor::CommandProcessor;
use crease_live::state::{Margin, MatchResult, Stage};

const MAX_COMMANDS: usize = 20_000;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    matches: usize,
    won_by_runs: usize,
    won_by_wickets: usize,
    ties: usize,
    super_overs: usize,
    commands: usize,
}

impl Tally {
    fn merge(self, other: Tally) -> Tally {
        Tally {
            matches: self.matches + other.matches,
            won_by_runs: self.won_by_runs + other.won_by_runs,
            won_by_wickets: self.won_by_wickets + other.won_by_wickets,
            ties: self.ties + other.ties,
            super_overs: self.super_overs + other.super_overs,
            commands: self.commands + other.commands,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let count = parse_u64_arg("--matches").unwrap_or(1_000).clamp(1, 1_000_000);
    let overs = parse_u64_arg("--overs").unwrap_or(20).clamp(1, 50) as u32;
    let seed = parse_u64_arg("--seed").unwrap_or(2026);

    let outcomes: Vec<Result<Tally, String>> = (0..count)
        .into_par_iter()
        .map(|idx| simulate_one(seed.wrapping_add(idx), overs))
        .collect();

    let mut tally = Tally::default();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(one) => tally = tally.merge(one),
            Err(err) => failures.push(err),
        }
    }

    println!(
        "matches={} commands={} won_by_runs={} won_by_wickets={} ties={} super_overs={}",
        tally.matches,
        tally.commands,
        tally.won_by_runs,
        tally.won_by_wickets,
        tally.ties,
        tally.super_overs
    );
    if !failures.is_empty() {
        for failure in failures.iter().take(10) {
            eprintln!("violation: {failure}");
        }
        bail!("{} simulated matches broke an invariant", failures.len());
    }
    Ok(())
}

fn simulate_one(seed: u64, overs: u32) -> Result<Tally, String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let stage = if seed % 2 == 0 {
        Stage::Knockout
    } else {
        Stage::League
    };
    let setup = demo_setup_with(&format!("sim-{seed}"), overs, stage);
    let mut processor = CommandProcessor::new(setup).map_err(|err| err.to_string())?;
    let commands = play_to_completion(&mut processor, &mut rng, MAX_COMMANDS)
        .map_err(|err| format!("seed {seed}: demo command rejected: {err}"))?;

    let snapshot = processor.snapshot();
    if !snapshot.is_final() {
        return Err(format!("seed {seed}: match not final after {commands} commands"));
    }
    for innings in processor.state().all_innings() {
        let totals = innings.totals();
        let progress = innings.progress();
        let bat: u32 = progress.batters.iter().map(|b| b.runs).sum();
        if bat + totals.extras.total() != totals.runs {
            return Err(format!("seed {seed}: {} runs do not add up", innings.slot()));
        }
        if totals.legal_balls > innings.limits().max_balls
            || totals.wickets > innings.limits().max_wickets
        {
            return Err(format!("seed {seed}: {} exceeded its limits", innings.slot()));
        }
        if !innings.ledger().is_gapless() || !innings.verify_replay() {
            return Err(format!("seed {seed}: {} ledger does not replay", innings.slot()));
        }
    }
    let replayed = CommandProcessor::replay(&processor.export())
        .map_err(|err| format!("seed {seed}: journal replay rejected: {err}"))?;
    if replayed.snapshot() != snapshot {
        return Err(format!("seed {seed}: journal replay diverged"));
    }

    let mut tally = Tally {
        matches: 1,
        commands,
        ..Tally::default()
    };
    match &snapshot.result {
        Some(MatchResult::Win {
            margin: Margin::Runs(_),
            ..
        }) => tally.won_by_runs += 1,
        Some(MatchResult::Win {
            margin: Margin::Wickets(_),
            ..
        }) => tally.won_by_wickets += 1,
        Some(MatchResult::Tie) => tally.ties += 1,
        _ => {}
    }
    if snapshot.super_over_result.is_some() {
        tally.super_overs += 1;
    }
    Ok(tally)
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}
