use std::fmt;

use crate::database::SessionStatus;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    End,
    Review,
    Cancel,
}

impl SessionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Start => "start",
            SessionAction::End => "end",
            SessionAction::Review => "review",
            SessionAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single place where legal session status changes are enumerated.
///
/// `Start` is accepted on an already active session so a repeated start
/// re-stamps the start time. Nothing leads into `Paused`.
pub fn transition(from: SessionStatus, action: SessionAction) -> Result<SessionStatus> {
    use SessionAction::*;
    use SessionStatus::*;

    let next = match (from, action) {
        (Scheduled | Active | Paused, Start) => Active,
        (Scheduled | Active | Paused, End) => Completed,
        (Completed | Reviewed, Review) => Reviewed,
        (Scheduled | Active | Paused, Cancel) => Cancelled,
        _ => {
            return Err(EngineError::InvalidTransition {
                state: from.to_string(),
                action: action.as_str(),
            })
        }
    };
    Ok(next)
}
