//! User-facing scheduler errors.
//!
//! Only genuine user mistakes surface as typed errors: the scheduler needs a
//! literal estimate on every output dimension before it can size anything.
//! Unknown extents discovered *during* the search are not errors; they are a
//! normal signal encoded as unknown costs and simply make the affected fusion
//! choice unattractive. Internal contract violations abort instead.

use std::fmt;

/// An input problem the user has to fix before scheduling can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    /// An output dimension has no estimate at all.
    MissingEstimate { func: String, var: String },
    /// An output dimension has an estimate whose bounds are not integer
    /// literals.
    NonLiteralEstimate { func: String, var: String },
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserError::MissingEstimate { func, var } => write!(
                f,
                "output '{func}' has no estimate for dimension '{var}'; every output dimension needs one"
            ),
            UserError::NonLiteralEstimate { func, var } => write!(
                f,
                "estimate for dimension '{var}' of output '{func}' must have integer literal min and extent"
            ),
        }
    }
}

impl std::error::Error for UserError {}
