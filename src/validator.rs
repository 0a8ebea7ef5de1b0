use crate::error::RosterIssue;
use crate::state::{BatterFigures, Crease, End, TeamSheet};

/// Checks actors against the frozen XIs of one innings. Never mutates anything.
pub struct RosterValidator<'a> {
    batting: &'a TeamSheet,
    bowling: &'a TeamSheet,
}

impl<'a> RosterValidator<'a> {
    pub fn new(batting: &'a TeamSheet, bowling: &'a TeamSheet) -> Self {
        Self { batting, bowling }
    }

    pub fn check_batter(&self, player: &str) -> Result<(), RosterIssue> {
        if self.batting.contains(player) {
            Ok(())
        } else {
            Err(RosterIssue::NotInPlayingXi {
                player: player.to_string(),
                team: self.batting.team_id.clone(),
            })
        }
    }

    pub fn check_bowler(&self, player: &str) -> Result<(), RosterIssue> {
        if self.bowling.contains(player) {
            Ok(())
        } else {
            Err(RosterIssue::NotInPlayingXi {
                player: player.to_string(),
                team: self.bowling.team_id.clone(),
            })
        }
    }

    pub fn check_fielder(&self, player: Option<&str>) -> Result<(), RosterIssue> {
        match player {
            Some(player) => self.check_bowler(player),
            None => Ok(()),
        }
    }

    pub fn check_opening(&self, striker: &str, non_striker: &str, bowler: &str) -> Result<(), RosterIssue> {
        self.check_batter(striker)?;
        self.check_batter(non_striker)?;
        if striker == non_striker {
            return Err(RosterIssue::DuplicateAssignment {
                player: striker.to_string(),
            });
        }
        self.check_bowler(bowler)
    }

    /// `previous_over` is the bowler of the last completed over; `mid_over` is set when the
    /// change happens before the current over has finished.
    pub fn check_bowler_change(
        &self,
        bowler: &str,
        crease: &Crease,
        previous_over: Option<&str>,
        mid_over: bool,
    ) -> Result<(), RosterIssue> {
        self.check_bowler(bowler)?;
        if previous_over == Some(bowler) {
            return Err(RosterIssue::ConsecutiveOvers {
                bowler: bowler.to_string(),
            });
        }
        if mid_over && crease.bowler == bowler {
            return Err(RosterIssue::SameBowler {
                bowler: bowler.to_string(),
            });
        }
        Ok(())
    }

    pub fn check_new_batter(
        &self,
        player: &str,
        crease: &Crease,
        batters: &[BatterFigures],
    ) -> Result<(), RosterIssue> {
        self.check_batter(player)?;
        if crease.is_batting(player) {
            return Err(RosterIssue::DuplicateAssignment {
                player: player.to_string(),
            });
        }
        let dismissed = batters
            .iter()
            .any(|b| b.player == player && b.dismissal.is_some());
        if dismissed {
            return Err(RosterIssue::AlreadyDismissed {
                player: player.to_string(),
            });
        }
        Ok(())
    }

    pub fn run_out_end(&self, end: Option<End>) -> Result<End, RosterIssue> {
        end.ok_or(RosterIssue::AmbiguousRunOut)
    }

    pub fn retiring_end(&self, player: &str, crease: &Crease) -> Result<End, RosterIssue> {
        crease.end_of(player).ok_or_else(|| RosterIssue::NotAtCrease {
            player: player.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(team: &str, prefix: &str) -> TeamSheet {
        TeamSheet {
            team_id: team.to_string(),
            playing_xi: (1..=11).map(|n| format!("{prefix}{n}")).collect(),
            captain: None,
            wicketkeeper: None,
        }
    }

    fn crease() -> Crease {
        Crease {
            striker: "A1".to_string(),
            non_striker: "A2".to_string(),
            bowler: "B11".to_string(),
        }
    }

    #[test]
    fn opening_pair_must_be_distinct_and_on_the_right_side() {
        let (a, b) = (sheet("A", "A"), sheet("B", "B"));
        let v = RosterValidator::new(&a, &b);
        assert!(v.check_opening("A1", "A2", "B11").is_ok());
        assert!(matches!(
            v.check_opening("A1", "A1", "B11"),
            Err(RosterIssue::DuplicateAssignment { .. })
        ));
        assert!(matches!(
            v.check_opening("A1", "B2", "B11"),
            Err(RosterIssue::NotInPlayingXi { .. })
        ));
        assert!(matches!(
            v.check_opening("A1", "A2", "A11"),
            Err(RosterIssue::NotInPlayingXi { team, .. }) if team == "B"
        ));
    }

    #[test]
    fn no_back_to_back_overs() {
        let (a, b) = (sheet("A", "A"), sheet("B", "B"));
        let v = RosterValidator::new(&a, &b);
        let c = crease();
        assert_eq!(
            v.check_bowler_change("B11", &c, Some("B11"), false),
            Err(RosterIssue::ConsecutiveOvers {
                bowler: "B11".to_string()
            })
        );
        assert!(v.check_bowler_change("B10", &c, Some("B11"), false).is_ok());
        assert!(matches!(
            v.check_bowler_change("B11", &c, None, true),
            Err(RosterIssue::SameBowler { .. })
        ));
    }

    #[test]
    fn replacement_batter_cannot_already_be_in() {
        let (a, b) = (sheet("A", "A"), sheet("B", "B"));
        let v = RosterValidator::new(&a, &b);
        let c = crease();
        let mut out = BatterFigures::new("A3".to_string());
        out.dismissal = Some(crate::state::WicketDetail {
            kind: crate::state::WicketType::Bowled,
            dismissed: "A3".to_string(),
            fielder: None,
            bowler: "B11".to_string(),
        });
        assert!(matches!(
            v.check_new_batter("A2", &c, &[]),
            Err(RosterIssue::DuplicateAssignment { .. })
        ));
        assert!(matches!(
            v.check_new_batter("A3", &c, &[out]),
            Err(RosterIssue::AlreadyDismissed { .. })
        ));
        assert!(v.check_new_batter("A4", &c, &[]).is_ok());
        assert_eq!(v.run_out_end(None), Err(RosterIssue::AmbiguousRunOut));
    }
}
