use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    Active,
    /// Present in the schema; no lifecycle operation enters it.
    Paused,
    Completed,
    Cancelled,
    Reviewed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Reviewed => "REVIEWED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SCHEDULED" => Ok(SessionStatus::Scheduled),
            "ACTIVE" => Ok(SessionStatus::Active),
            "PAUSED" => Ok(SessionStatus::Paused),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            "REVIEWED" => Ok(SessionStatus::Reviewed),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    NotStarted,
    Running,
    Paused,
    Expired,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::NotStarted => "NOT_STARTED",
            TimerStatus::Running => "RUNNING",
            TimerStatus::Paused => "PAUSED",
            TimerStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NOT_STARTED" => Ok(TimerStatus::NotStarted),
            "RUNNING" => Ok(TimerStatus::Running),
            "PAUSED" => Ok(TimerStatus::Paused),
            "EXPIRED" => Ok(TimerStatus::Expired),
            other => Err(format!("unknown timer status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: Uuid,
    pub question_id: Option<Uuid>,
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    pub language: String,
    pub code: String,
    pub status: SessionStatus,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Minutes; fixed at creation.
    pub timer_duration: i32,
    /// Seconds; never negative.
    pub timer_remaining: i32,
    pub timer_status: TimerStatus,
    pub interviewer_feedback: Option<String>,
    pub rating: Option<i32>,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the registry needs to mint a session. Identity and
/// timestamps are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub question_id: Uuid,
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    pub language: String,
    pub code: String,
    pub timer_duration: i32,
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

impl NewSession {
    pub fn into_session(self, id: Uuid, now: DateTime<Utc>) -> InterviewSession {
        InterviewSession {
            id,
            question_id: Some(self.question_id),
            candidate_id: self.candidate_id,
            interviewer_id: self.interviewer_id,
            language: self.language,
            code: self.code,
            status: SessionStatus::Scheduled,
            scheduled_start_time: self.scheduled_start_time,
            actual_start_time: None,
            end_time: None,
            timer_duration: self.timer_duration,
            timer_remaining: self.timer_duration.saturating_mul(60).max(0),
            timer_status: TimerStatus::NotStarted,
            interviewer_feedback: None,
            rating: None,
            score: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub starter_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: Uuid,
    pub question_id: Uuid,
    pub input: String,
    pub expected_output: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default = "default_points")]
    pub points: i32,
    /// Seconds.
    #[serde(default)]
    pub time_limit: Option<i32>,
    /// Megabytes.
    #[serde(default)]
    pub memory_limit: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_points() -> i32 {
    10
}

/// One row per (session, test case) evaluation attempt. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub test_case_id: Uuid,
    pub passed: bool,
    pub actual_output: Option<String>,
    pub error_message: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub status_description: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_text() {
        for status in [
            SessionStatus::Scheduled,
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Reviewed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("RUNNING".parse::<SessionStatus>().is_err());
        assert_eq!("NOT_STARTED".parse::<TimerStatus>(), Ok(TimerStatus::NotStarted));
    }

    #[test]
    fn test_new_session_defaults() {
        let now = Utc::now();
        let session = NewSession {
            question_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            interviewer_id: Uuid::new_v4(),
            language: "javascript".to_string(),
            code: String::new(),
            timer_duration: 45,
            scheduled_start_time: None,
        }
        .into_session(Uuid::new_v4(), now);

        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.timer_status, TimerStatus::NotStarted);
        assert_eq!(session.timer_remaining, 45 * 60);
        assert_eq!(session.created_at, session.updated_at);
        assert!(session.score.is_none());
    }

    #[test]
    fn test_session_serializes_enum_names() {
        let json = serde_json::to_value(TimerStatus::NotStarted).unwrap();
        assert_eq!(json, serde_json::json!("NOT_STARTED"));
        let json = serde_json::to_value(SessionStatus::Reviewed).unwrap();
        assert_eq!(json, serde_json::json!("REVIEWED"));
    }

    #[test]
    fn test_test_case_fixture_defaults() {
        let case: TestCase = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "questionId": Uuid::nil(),
            "input": "1 2",
            "expectedOutput": "3"
        }))
        .unwrap();
        assert_eq!(case.points, 10);
        assert!(!case.is_hidden);
        assert!(case.description.is_none());
    }
}
