//! Pipeline run phases
//!
//! `Idle → Traversing ⇄ Stabilizing → Extracting → Aggregating → Done`.
//!
//! Traversing and Stabilizing interleave per discovered page; Extracting
//! runs once over the whole accumulated job set. There is no abort phase:
//! per-item failures end up in the aggregate's failure list and the run
//! still reaches Done.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    Idle,
    Traversing,
    Stabilizing,
    Extracting,
    Aggregating,
    Done,
}

impl RunPhase {
    /// Returns true if the transition from self to `to` is legal
    pub fn can_transition_to(&self, to: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, to),
            (Idle, Traversing)
                | (Traversing, Stabilizing)
                | (Stabilizing, Traversing)
                | (Traversing, Extracting)
                | (Extracting, Aggregating)
                | (Aggregating, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Traversing => "traversing",
            Self::Stabilizing => "stabilizing",
            Self::Extracting => "extracting",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
