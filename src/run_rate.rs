/// Runs per over so far. Zero before the first legal ball.
pub fn current_run_rate(runs: u32, legal_balls: u32, balls_per_over: u32) -> f64 {
    if legal_balls == 0 || balls_per_over == 0 {
        return 0.0;
    }
    runs as f64 * balls_per_over as f64 / legal_balls as f64
}

/// Runs per over needed from the balls left. `None` once no balls remain.
pub fn required_run_rate(runs_remaining: u32, balls_remaining: u32, balls_per_over: u32) -> Option<f64> {
    if balls_remaining == 0 || balls_per_over == 0 {
        return None;
    }
    Some(runs_remaining as f64 * balls_per_over as f64 / balls_remaining as f64)
}

/// Total reached if the current rate holds for the whole allocation.
pub fn projected_total(runs: u32, legal_balls: u32, max_balls: u32, balls_per_over: u32) -> u32 {
    if legal_balls == 0 {
        return runs;
    }
    let rate = current_run_rate(runs, legal_balls, balls_per_over);
    let remaining_overs = max_balls.saturating_sub(legal_balls) as f64 / balls_per_over.max(1) as f64;
    runs + (rate * remaining_overs).round() as u32
}

/// Scorebook notation: completed overs, a dot, then balls of the current over (`18.3`).
pub fn overs_notation(legal_balls: u32, balls_per_over: u32) -> String {
    if balls_per_over == 0 {
        return "0.0".to_string();
    }
    format!("{}.{}", legal_balls / balls_per_over, legal_balls % balls_per_over)
}

pub fn parse_overs(raw: &str, balls_per_over: u32) -> Option<u32> {
    let raw = raw.trim();
    let (overs, balls) = match raw.split_once('.') {
        Some((o, b)) => (o.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
        None => (raw.parse::<u32>().ok()?, 0),
    };
    if balls >= balls_per_over {
        return None;
    }
    Some(overs * balls_per_over + balls)
}
