use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::{BallEvent, Crease, EventPayload, ExtraType, WicketDetail};

/// Append-only event log for one innings. Undo is a compensating entry; nothing is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    events: Vec<BallEvent>,
}

pub struct Entry {
    pub payload: EventPayload,
    pub runs: u32,
    pub legal: bool,
    pub extra: Option<ExtraType>,
    pub wicket: Option<WicketDetail>,
    pub crease: Crease,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[BallEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&BallEvent> {
        self.events.last()
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.last().map(|e| e.sequence + 1).unwrap_or(1)
    }

    pub fn append(&mut self, entry: Entry) -> &BallEvent {
        let event = BallEvent {
            sequence: self.next_sequence(),
            payload: entry.payload,
            runs: entry.runs,
            legal: entry.legal,
            extra: entry.extra,
            wicket: entry.wicket,
            crease: entry.crease,
            recorded_at: Utc::now(),
        };
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn cancelled(&self) -> HashSet<u64> {
        self.events
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::Undo { cancels } => Some(cancels),
                _ => None,
            })
            .collect()
    }

    /// Events that still count: not undo entries and not cancelled by one.
    pub fn effective(&self) -> Vec<&BallEvent> {
        let cancelled = self.cancelled();
        self.events
            .iter()
            .filter(|e| !matches!(e.payload, EventPayload::Undo { .. }))
            .filter(|e| !cancelled.contains(&e.sequence))
            .collect()
    }

    pub fn last_effective(&self) -> Option<&BallEvent> {
        self.effective().last().copied()
    }

    pub fn is_gapless(&self) -> bool {
        self.events
            .iter()
            .enumerate()
            .all(|(idx, e)| e.sequence == idx as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crease() -> Crease {
        Crease {
            striker: "s".to_string(),
            non_striker: "n".to_string(),
            bowler: "b".to_string(),
        }
    }

    fn entry(payload: EventPayload) -> Entry {
        Entry {
            payload,
            runs: 0,
            legal: true,
            extra: None,
            wicket: None,
            crease: crease(),
        }
    }

    #[test]
    fn sequences_start_at_one_and_stay_gapless() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.next_sequence(), 1);
        ledger.append(entry(EventPayload::Run { runs: 1 }));
        ledger.append(entry(EventPayload::Swap));
        ledger.append(entry(EventPayload::Undo { cancels: 2 }));
        assert_eq!(ledger.len(), 3);
        assert!(ledger.is_gapless());
    }

    #[test]
    fn undo_entries_hide_their_target() {
        let mut ledger = Ledger::new();
        ledger.append(entry(EventPayload::Run { runs: 1 }));
        ledger.append(entry(EventPayload::Run { runs: 4 }));
        ledger.append(entry(EventPayload::Undo { cancels: 2 }));
        let effective: Vec<u64> = ledger.effective().iter().map(|e| e.sequence).collect();
        assert_eq!(effective, vec![1]);
        assert_eq!(ledger.last_effective().map(|e| e.sequence), Some(1));
        // The cancelled entry is kept for audit.
        assert_eq!(ledger.events()[1].payload, EventPayload::Run { runs: 4 });
    }
}
