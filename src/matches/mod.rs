// Public API
pub use collaborators::{
    BadgeChecker, CollaboratorError, EloRecalculator, NoOpBadgeChecker, NoOpEloRecalculator,
};
pub use completion::{is_match_finished, owe_entries};
pub use models::{Match, MatchMode, MatchOutcome, MatchType, NewMatch, OweEntry, OweType};

// Internal modules
mod collaborators;
mod completion;
mod models;
