use crate::state::ExtraType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Run,
    Extra(ExtraType),
    Wicket,
}

impl DeliveryKind {
    pub fn is_legal(self) -> bool {
        match self {
            DeliveryKind::Run | DeliveryKind::Wicket => true,
            DeliveryKind::Extra(extra) => extra.is_legal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BallOutcome {
    pub legal: bool,
    pub legal_balls: u32,
    /// Last ball of an over, including the final over.
    pub ends_over: bool,
    /// An over finished with balls still to come: a new bowler is needed.
    pub over_boundary: bool,
    pub innings_exhausted: bool,
}

pub fn track(legal_balls: u32, balls_per_over: u32, ball_limit: u32, kind: DeliveryKind) -> BallOutcome {
    let legal = kind.is_legal();
    let count = if legal { legal_balls + 1 } else { legal_balls };
    let ends_over = legal && balls_per_over > 0 && count % balls_per_over == 0;
    BallOutcome {
        legal,
        legal_balls: count,
        ends_over,
        over_boundary: ends_over && is_over_boundary(count, balls_per_over, ball_limit),
        innings_exhausted: count >= ball_limit,
    }
}

pub fn is_over_boundary(count: u32, balls_per_over: u32, ball_limit: u32) -> bool {
    balls_per_over > 0 && count > 0 && count < ball_limit && count % balls_per_over == 0
}
