use std::fmt::Write as _;

use anyhow::{Context, Result, anyhow, bail};

use crate::run_rate;
use crate::state::{
    Command, End, ExtraType, InningsSnapshot, InningsStatus, MatchSnapshot, PlayerId, WicketType,
};

pub const HELP: &str = "\
commands:
  0-6 | run <n>                         runs off the bat
  wd [n] | nb [n] | b <n> | lb <n>      extras (n = runs actually run)
  out <kind> <new|-> [fielder]          bowled, caught, lbw, stumped, hitwicket
  runout <striker|non> <runs> <new|-> [fielder]
  swap | undo | bowler <id> | retire <id> <new>
  start1 <team> <striker> <non> <bowler>
  start2 <striker> <non> <bowler>
  superover <striker> <non> <bowler>
  resolve <team> | abandon <reason>
  {json}                                any command as JSON
  show | export | help | quit";

/// Parses one console line into a command. JSON objects are accepted verbatim.
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.starts_with('{') {
        return serde_json::from_str(line).context("invalid command json");
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        bail!("empty command");
    };

    if let Ok(runs) = head.parse::<u32>() {
        return Ok(Command::Run { runs });
    }

    let command = match head.to_ascii_lowercase().as_str() {
        "run" => Command::Run {
            runs: number(args, 0, "runs")?,
        },
        "wd" | "wide" => extra(ExtraType::Wide, args, 0)?,
        "nb" | "noball" => extra(ExtraType::NoBall, args, 0)?,
        "b" | "bye" => extra(ExtraType::Bye, args, 1)?,
        "lb" | "legbye" => extra(ExtraType::LegBye, args, 1)?,
        "out" => {
            let kind = wicket_kind(word(args, 0, "dismissal kind")?)?;
            Command::Wicket {
                kind,
                runs_with_wicket: 0,
                new_batter: optional_player(args.get(1)),
                run_out_batsman: None,
                fielder: args.get(2).map(|p| p.to_string()),
            }
        }
        "runout" => {
            let end = match word(args, 0, "end")?.to_ascii_lowercase().as_str() {
                "striker" | "s" => End::Striker,
                "non" | "non-striker" | "ns" => End::NonStriker,
                other => bail!("unknown end {other:?}"),
            };
            Command::Wicket {
                kind: WicketType::RunOut,
                runs_with_wicket: number(args, 1, "runs")?,
                new_batter: optional_player(args.get(2)),
                run_out_batsman: Some(end),
                fielder: args.get(3).map(|p| p.to_string()),
            }
        }
        "swap" => Command::Swap,
        "undo" => Command::Undo,
        "bowler" => Command::ChangeBowler {
            bowler: player(args, 0, "bowler")?,
        },
        "retire" => Command::Retire {
            retiring_batter: player(args, 0, "retiring batter")?,
            new_batter: optional_player(args.get(1)),
        },
        "start1" => Command::StartFirstInnings {
            batting_team: player(args, 0, "batting team")?,
            striker: player(args, 1, "striker")?,
            non_striker: player(args, 2, "non-striker")?,
            bowler: player(args, 3, "bowler")?,
        },
        "start2" => Command::StartSecondInnings {
            striker: player(args, 0, "striker")?,
            non_striker: player(args, 1, "non-striker")?,
            bowler: player(args, 2, "bowler")?,
        },
        "superover" => Command::StartSuperOver {
            striker: player(args, 0, "striker")?,
            non_striker: player(args, 1, "non-striker")?,
            bowler: player(args, 2, "bowler")?,
        },
        "resolve" => Command::ResolveTie {
            winner: player(args, 0, "winning team")?,
        },
        "abandon" => Command::Abandon {
            reason: if args.is_empty() {
                "abandoned".to_string()
            } else {
                args.join(" ")
            },
        },
        other => bail!("unknown command {other:?} (try `help`)"),
    };
    Ok(command)
}

fn word<'a>(args: &[&'a str], idx: usize, what: &str) -> Result<&'a str> {
    args.get(idx).copied().ok_or_else(|| anyhow!("missing {what}"))
}

fn player(args: &[&str], idx: usize, what: &str) -> Result<PlayerId> {
    word(args, idx, what).map(str::to_string)
}

fn optional_player(arg: Option<&&str>) -> Option<PlayerId> {
    arg.filter(|p| **p != "-").map(|p| p.to_string())
}

fn number(args: &[&str], idx: usize, what: &str) -> Result<u32> {
    let raw = word(args, idx, what)?;
    raw.parse().with_context(|| format!("{what} must be a number, got {raw:?}"))
}

fn extra(kind: ExtraType, args: &[&str], default: u32) -> Result<Command> {
    let additional_runs = if args.is_empty() {
        default
    } else {
        number(args, 0, "runs")?
    };
    Ok(Command::Extra {
        extra: kind,
        additional_runs,
    })
}

fn wicket_kind(raw: &str) -> Result<WicketType> {
    Ok(match raw.to_ascii_lowercase().as_str() {
        "bowled" | "b" => WicketType::Bowled,
        "caught" | "c" => WicketType::Caught,
        "lbw" => WicketType::Lbw,
        "stumped" | "st" => WicketType::Stumped,
        "hitwicket" | "hw" => WicketType::HitWicket,
        "runout" => bail!("use `runout <end> <runs> <new>` for run outs"),
        other => bail!("unknown dismissal {other:?}"),
    })
}

/// One line per innings plus the chase and result, e.g. `AUS 151/4 (18.3) RR 8.16`.
pub fn render_scoreline(snapshot: &MatchSnapshot) -> String {
    let mut out = String::new();
    for innings in &snapshot.innings {
        let _ = writeln!(out, "{}", innings_line(innings));
    }
    if let Some(chase) = snapshot.chase
        && snapshot
            .current()
            .is_some_and(|i| i.status == InningsStatus::InProgress)
    {
        let rrr = chase
            .required_run_rate
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  target {}: need {} off {} (RRR {rrr})",
            chase.target_runs, chase.runs_remaining, chase.balls_remaining
        );
    }
    if let Some(result) = &snapshot.result {
        let _ = writeln!(out, "result: {result}");
    }
    if let Some(result) = &snapshot.super_over_result {
        let _ = writeln!(out, "super over: {result}");
    }
    if let Some(winner) = &snapshot.tie_break_winner {
        let _ = writeln!(out, "tie-break: {winner} advance");
    }
    if let Some(reason) = &snapshot.abandoned {
        let _ = writeln!(out, "abandoned: {reason}");
    }
    let _ = write!(out, "phase: {:?}", snapshot.phase);
    out
}

fn innings_line(innings: &InningsSnapshot) -> String {
    let mut line = format!(
        "{} {}/{} ({}) RR {:.2} [{}]",
        innings.batting_team,
        innings.totals.runs,
        innings.totals.wickets,
        innings.overs(),
        innings.current_run_rate(),
        innings.slot
    );
    if let Some(crease) = &innings.crease
        && innings.status == InningsStatus::InProgress
    {
        let _ = write!(
            line,
            "  {}* {} | {}",
            crease.striker, crease.non_striker, crease.bowler
        );
        if innings.awaiting_bowler_change {
            line.push_str(" (new bowler needed)");
        }
        if innings.target.is_none() && innings.totals.legal_balls > 0 {
            let projected = run_rate::projected_total(
                innings.totals.runs,
                innings.totals.legal_balls,
                innings.max_balls,
                innings.balls_per_over,
            );
            let _ = write!(line, "  proj {projected}");
        }
    }
    line
}

/// Full batting and bowling cards for every innings.
pub fn render_scorecard(snapshot: &MatchSnapshot) -> String {
    let mut out = String::new();
    for innings in &snapshot.innings {
        let _ = writeln!(out, "== {} ({}) ==", innings.batting_team, innings.slot);
        for batter in &innings.batters {
            let how = match (&batter.dismissal, batter.retired) {
                (Some(d), _) => {
                    let kind = format!("{:?}", d.kind).to_lowercase();
                    format!("{kind} b {}", d.bowler)
                }
                (None, true) => "retired hurt".to_string(),
                (None, false) => "not out".to_string(),
            };
            let _ = writeln!(
                out,
                "  {:<12} {:<22} {:>3} ({:>3}) 4s {} 6s {}",
                batter.player, how, batter.runs, batter.balls, batter.fours, batter.sixes
            );
        }
        let extras = innings.totals.extras;
        let _ = writeln!(
            out,
            "  extras {} (w {}, nb {}, b {}, lb {})",
            extras.total(),
            extras.wides,
            extras.no_balls,
            extras.byes,
            extras.leg_byes
        );
        let _ = writeln!(
            out,
            "  total  {}/{} ({} ov)",
            innings.totals.runs,
            innings.totals.wickets,
            innings.overs()
        );
        if !innings.fall_of_wickets.is_empty() {
            let fow: Vec<String> = innings
                .fall_of_wickets
                .iter()
                .map(|f| {
                    format!(
                        "{}-{} ({}, {})",
                        f.wicket,
                        f.runs,
                        f.player,
                        run_rate::overs_notation(f.legal_balls, innings.balls_per_over)
                    )
                })
                .collect();
            let _ = writeln!(out, "  fow    {}", fow.join(", "));
        }
        for bowler in &innings.bowlers {
            let _ = writeln!(
                out,
                "  {:<12} {:>5}-{}-{}-{}  wd {} nb {}",
                bowler.player,
                run_rate::overs_notation(bowler.legal_balls, innings.balls_per_over),
                bowler.maidens,
                bowler.runs_conceded,
                bowler.wickets,
                bowler.wides,
                bowler.no_balls
            );
        }
    }
    out.push_str(&render_scoreline(snapshot));
    out
}
