//! The replicated log as seen by the voter: only its tail matters when deciding a vote.

use super::Term;
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

/// 1-based position of an entry in the log, 0 meaning "no entry"
pub type Index = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item<Command> {
    pub term: Term,
    pub command: Command,
}

impl<Command> Item<Command> {
    pub fn new(term: Term, command: Command) -> Self {
        Item { term, command }
    }
}

/// Summary of a log's last entry.
///
/// Field order matters: the derived ordering compares `term` first and `index` second, which is exactly
/// "at least as up-to-date" (§5.4.1). Comparing `Option<LogPosition>`s puts an empty log (`None`) below any
/// non-empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub term: Term,
    pub index: Index,
}

impl LogPosition {
    pub fn new(term: Term, index: Index) -> Self {
        LogPosition { term, index }
    }
}

pub trait Log {
    type Command;

    fn len(&self) -> Index;

    /// Term of the entry at `index`, `None` if there is no such entry
    fn get_term(&self, index: Index) -> Option<Term>;

    fn append(&mut self, term: Term, command: Self::Command) -> Index;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn last_log_index(&self) -> Index {
        self.len()
    }

    /// 0 for an empty log
    fn last_log_term(&self) -> Term {
        self.get_term(self.len()).unwrap_or(0)
    }

    fn last_position(&self) -> Option<LogPosition> {
        let index = self.len();
        self.get_term(index).map(|term| LogPosition { term, index })
    }

    /// Compares this log's tail with a candidate's claimed tail. Anything but `Greater` means the candidate's
    /// log is at least as up-to-date as this one.
    fn cmp_tail(&self, candidate: LogPosition) -> Ordering {
        self.last_position().cmp(&Some(candidate))
    }
}

pub type InVec<Command> = Vec<Item<Command>>;

impl<Command> Log for InVec<Command> {
    type Command = Command;

    fn len(&self) -> Index {
        Vec::len(self)
    }

    fn get_term(&self, index: Index) -> Option<Term> {
        if index == 0 {
            None
        } else {
            self.get(index - 1).map(|item| item.term)
        }
    }

    fn append(&mut self, term: Term, command: Command) -> Index {
        self.push(Item::new(term, command));
        Vec::len(self)
    }
}
