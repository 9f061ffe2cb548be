pub mod judge0;

pub use judge0::{Judge0Client, Judge0Config};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend returned HTTP {0}")]
    Status(u16),
    #[error("Malformed backend response: {0}")]
    Decode(String),
    #[error("{0}")]
    Backend(String),
}

/// What the backend reports for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub status_description: String,
}

impl ExecutionOutcome {
    /// Program output as shown to participants: stdout, stderr on a new
    /// line when both are present, or stderr alone.
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// `None` when the run succeeded.
    pub fn error_message(&self) -> Option<String> {
        if self.succeeded {
            return None;
        }
        if self.compile_output.is_empty() {
            Some(self.status_description.clone())
        } else {
            Some(format!("{}\n{}", self.status_description, self.compile_output))
        }
    }
}

/// The external code-execution backend.
///
/// Callers treat every error as recoverable for the single run it belongs
/// to. Implementations do not retry.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, code: &str, language: &str, stdin: &str) -> Result<ExecutionOutcome, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(succeeded: bool, stdout: &str, stderr: &str, compile: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            succeeded,
            stdout: stdout.into(),
            stderr: stderr.into(),
            compile_output: compile.into(),
            status_description: if succeeded { "Accepted".into() } else { "Runtime Error (NZEC)".into() },
        }
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(outcome(true, "42", "", "").combined_output(), "42");
        assert_eq!(outcome(false, "", "boom", "").combined_output(), "boom");
        assert_eq!(outcome(false, "42", "warn", "").combined_output(), "42\nwarn");
        assert_eq!(outcome(true, "", "", "").combined_output(), "");
    }

    #[test]
    fn test_error_message_only_on_failure() {
        assert_eq!(outcome(true, "42", "", "").error_message(), None);
        assert_eq!(
            outcome(false, "", "", "").error_message().as_deref(),
            Some("Runtime Error (NZEC)")
        );
        assert_eq!(
            outcome(false, "", "", "main.c:1: error").error_message().as_deref(),
            Some("Runtime Error (NZEC)\nmain.c:1: error")
        );
    }
}
