use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CommandError, Result};
use crate::ledger::Ledger;
use crate::match_state::MatchState;
use crate::state::{AppliedEffect, Command, InningsSlot, MatchSetup, MatchSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub command: Command,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InningsLedger {
    pub slot: InningsSlot,
    pub ledger: Ledger,
}

/// Everything needed to audit a match or rebuild it elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerExport {
    pub setup: MatchSetup,
    pub journal: Vec<JournalEntry>,
    pub ledgers: Vec<InningsLedger>,
    pub snapshot: MatchSnapshot,
    pub exported_at: DateTime<Utc>,
}

/// Single writer for one match. Commands run against a working copy that replaces the live
/// state only when the whole chain succeeded.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    state: MatchState,
    journal: Vec<JournalEntry>,
}

impl CommandProcessor {
    pub fn new(setup: MatchSetup) -> Result<Self> {
        Ok(Self {
            state: MatchState::new(setup)?,
            journal: Vec::new(),
        })
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn submit(&mut self, command: Command) -> Result<AppliedEffect> {
        let mut working = self.state.clone();
        if let Err(err) = working.execute(&command) {
            warn!(
                match_id = %self.state.match_id(),
                command = command.label(),
                error = %err,
                "command rejected"
            );
            return Err(err);
        }
        self.state = working;
        let seq = self.journal.len() as u64 + 1;
        debug!(match_id = %self.state.match_id(), seq, command = command.label(), "command applied");
        self.journal.push(JournalEntry {
            seq,
            command,
            accepted_at: Utc::now(),
        });
        Ok(self.state.effect())
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        self.state.snapshot()
    }

    pub fn ledger(&self, slot: InningsSlot) -> Option<&Ledger> {
        self.state.ledger(slot)
    }

    pub fn export(&self) -> LedgerExport {
        LedgerExport {
            setup: self.state.setup().clone(),
            journal: self.journal.clone(),
            ledgers: self
                .state
                .all_innings()
                .iter()
                .map(|i| InningsLedger {
                    slot: i.slot(),
                    ledger: i.ledger().clone(),
                })
                .collect(),
            snapshot: self.state.snapshot(),
            exported_at: Utc::now(),
        }
    }

    /// Re-applies an exported journal to a fresh processor. Any rejection means the export does
    /// not describe a reachable match.
    pub fn replay(export: &LedgerExport) -> Result<Self> {
        let mut processor = Self::new(export.setup.clone())?;
        for entry in &export.journal {
            processor.submit(entry.command.clone())?;
        }
        Ok(processor)
    }
}

/// Shareable handle for one match. Writers queue on `gate`, one at a time; readers only take
/// the state lock, so a snapshot never counts as a command in flight.
#[derive(Debug, Clone)]
pub struct ScoringHandle {
    gate: Arc<Mutex<()>>,
    inner: Arc<RwLock<CommandProcessor>>,
}

impl ScoringHandle {
    pub fn new(processor: CommandProcessor) -> Self {
        Self {
            gate: Arc::new(Mutex::new(())),
            inner: Arc::new(RwLock::new(processor)),
        }
    }

    // A panic mid-submit cannot leave partial state behind, so poisoned locks are still usable.
    fn read(&self) -> RwLockReadGuard<'_, CommandProcessor> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CommandProcessor> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for any in-flight command, then applies this one.
    pub fn submit(&self, command: Command) -> Result<AppliedEffect> {
        let _turn = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.write().submit(command)
    }

    /// Applies the command only if no other command is in flight.
    pub fn try_submit(&self, command: Command) -> Result<AppliedEffect> {
        let _turn = match self.gate.try_lock() {
            Ok(turn) => turn,
            Err(TryLockError::WouldBlock) => return Err(CommandError::ConcurrentMutationRejected),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.write().submit(command)
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        self.read().snapshot()
    }

    pub fn ledger(&self, slot: InningsSlot) -> Option<Ledger> {
        self.read().ledger(slot).cloned()
    }

    pub fn export(&self) -> LedgerExport {
        self.read().export()
    }

    /// Runs `f` as the writer in flight. Used to model a long apply step.
    pub fn with_processor<T>(&self, f: impl FnOnce(&mut CommandProcessor) -> T) -> T {
        let _turn = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut self.write())
    }
}
