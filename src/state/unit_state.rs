/// Unit state definitions for tracking crawl progress
use std::fmt;

/// Represents where a work unit is in its crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    // ===== Active States =====
    /// Unit has been enumerated but not started
    Pending,

    /// First page is in flight; it tells us the reported page count
    FetchingFirstPage,

    /// Later pages are being drained in order
    FetchingSubsequentPages,

    // ===== Transitional =====
    /// First page came back with no listings
    Empty,

    // ===== Terminal States =====
    /// All pages drained (or unit was already checkpointed)
    Done,

    /// A page failed; the unit is not checkpointed
    Failed,
}

impl UnitState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is an allowed edge
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Pending, FetchingFirstPage)
                | (Pending, Done)
                | (FetchingFirstPage, Empty)
                | (FetchingFirstPage, FetchingSubsequentPages)
                | (FetchingFirstPage, Done)
                | (FetchingFirstPage, Failed)
                | (FetchingSubsequentPages, Done)
                | (FetchingSubsequentPages, Failed)
                | (Empty, Done)
        )
    }

    /// Converts the state to its log/database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::FetchingFirstPage => "fetching_first_page",
            Self::FetchingSubsequentPages => "fetching_subsequent_pages",
            Self::Empty => "empty",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!UnitState::Pending.is_terminal());
        assert!(!UnitState::FetchingFirstPage.is_terminal());
        assert!(!UnitState::FetchingSubsequentPages.is_terminal());
        assert!(!UnitState::Empty.is_terminal());

        assert!(UnitState::Done.is_terminal());
        assert!(UnitState::Failed.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(UnitState::Pending.can_transition_to(UnitState::FetchingFirstPage));
        assert!(UnitState::FetchingFirstPage.can_transition_to(UnitState::FetchingSubsequentPages));
        assert!(UnitState::FetchingSubsequentPages.can_transition_to(UnitState::Done));
    }

    #[test]
    fn test_checkpointed_unit_skips_to_done() {
        assert!(UnitState::Pending.can_transition_to(UnitState::Done));
    }

    #[test]
    fn test_empty_unit_path() {
        assert!(UnitState::FetchingFirstPage.can_transition_to(UnitState::Empty));
        assert!(UnitState::Empty.can_transition_to(UnitState::Done));
        assert!(!UnitState::Empty.can_transition_to(UnitState::FetchingSubsequentPages));
    }

    #[test]
    fn test_failed_only_from_fetching() {
        assert!(UnitState::FetchingFirstPage.can_transition_to(UnitState::Failed));
        assert!(UnitState::FetchingSubsequentPages.can_transition_to(UnitState::Failed));

        assert!(!UnitState::Pending.can_transition_to(UnitState::Failed));
        assert!(!UnitState::Empty.can_transition_to(UnitState::Failed));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        for next in [
            UnitState::Pending,
            UnitState::FetchingFirstPage,
            UnitState::FetchingSubsequentPages,
            UnitState::Empty,
            UnitState::Done,
            UnitState::Failed,
        ] {
            assert!(!UnitState::Done.can_transition_to(next));
            assert!(!UnitState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(UnitState::FetchingFirstPage.to_string(), "fetching_first_page");
        assert_eq!(UnitState::Done.to_string(), "done");
    }
}
