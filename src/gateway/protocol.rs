//! Wire format of the websocket gateway.
//!
//! Clients send one JSON object per text frame:
//! `{"requestId": "7", "action": "startTimer", "sessionId": "..."}`.
//! The server answers each request with a `response` or `error` frame
//! carrying the same `requestId`, and forwards broadcasts on subscribed
//! topics as `event` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::broadcast::{Published, Topic, TopicKind};
use crate::error::{EngineError, ErrorKind, Result};
use crate::interview::{CodeUpdate, InterviewEngine};
use crate::session::CreateSession;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    CreateSession(CreateSessionRequest),
    GetSession(SessionRef),
    ListByCandidate(CandidateRef),
    ListByInterviewer(InterviewerRef),
    StartSession(SessionRef),
    EndSession(SessionRef),
    CancelSession(SessionRef),
    DeleteSession(SessionRef),
    AddFeedback(FeedbackRequest),
    UpdateCode(UpdateCodeRequest),
    StartTimer(SessionRef),
    PauseTimer(SessionRef),
    UpdateTimer(UpdateTimerRequest),
    GetTimer(SessionRef),
    Evaluate(SessionRef),
    ListResults(SessionRef),
    Subscribe(TopicRef),
    Unsubscribe(TopicRef),
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub question_id: Uuid,
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    #[validate(range(min = 1, max = 600))]
    pub timer_duration_minutes: i32,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRef {
    pub candidate_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerRef {
    pub interviewer_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub session_id: Uuid,
    #[validate(length(max = 10000))]
    pub feedback: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCodeRequest {
    pub session_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Negative values are accepted and clamped to zero downstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimerRequest {
    pub session_id: Uuid,
    pub remaining_seconds: i32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRef {
    pub session_id: Uuid,
    pub topic: TopicKind,
}

impl TopicRef {
    pub fn topic(&self) -> Topic {
        Topic::new(self.session_id, self.topic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Response {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        data: Value,
    },
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
    Event {
        topic: String,
        payload: Value,
    },
}

impl ServerMessage {
    pub fn response(request_id: Option<String>, data: Value) -> Self {
        ServerMessage::Response { request_id, data }
    }

    pub fn error(request_id: Option<String>, error: &EngineError) -> Self {
        ServerMessage::Error {
            request_id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn event(published: &Published) -> Self {
        ServerMessage::Event {
            topic: published.topic.to_string(),
            payload: published.payload.clone(),
        }
    }
}

/// Decodes a text frame. Malformed JSON, unknown actions and unparsable
/// ids all surface as validation errors.
pub fn parse_envelope(text: &str) -> std::result::Result<Envelope, EngineError> {
    serde_json::from_str(text).map_err(|e| EngineError::Validation(e.to_string()))
}

/// Pulls `requestId` out of a frame that failed to decode, so the error
/// can still be correlated.
pub fn salvage_request_id(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("requestId")?.as_str().map(String::from)
}

fn check(request: &impl Validate) -> Result<()> {
    request.validate().map_err(|e| EngineError::Validation(e.to_string()))
}

fn to_data(value: impl Serialize) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(e.to_string()))
}

/// Runs an engine operation. Subscription requests are handled by the
/// connection and answer with a validation error here.
pub async fn execute(engine: &InterviewEngine, request: Request) -> Result<Value> {
    match request {
        Request::CreateSession(req) => {
            check(&req)?;
            to_data(
                engine
                    .create_session(CreateSession {
                        question_id: req.question_id,
                        candidate_id: req.candidate_id,
                        interviewer_id: req.interviewer_id,
                        timer_duration_minutes: req.timer_duration_minutes,
                        scheduled_start_time: req.scheduled_start_time,
                    })
                    .await?,
            )
        }
        Request::GetSession(r) => to_data(engine.get_session(r.session_id).await?),
        Request::ListByCandidate(r) => to_data(engine.sessions_by_candidate(r.candidate_id).await?),
        Request::ListByInterviewer(r) => to_data(engine.sessions_by_interviewer(r.interviewer_id).await?),
        Request::StartSession(r) => to_data(engine.start_session(r.session_id).await?),
        Request::EndSession(r) => to_data(engine.end_session(r.session_id).await?),
        Request::CancelSession(r) => to_data(engine.cancel_session(r.session_id).await?),
        Request::DeleteSession(r) => {
            engine.delete_session(r.session_id).await?;
            Ok(Value::Null)
        }
        Request::AddFeedback(req) => {
            check(&req)?;
            to_data(engine.add_feedback(req.session_id, req.feedback, req.rating).await?)
        }
        Request::UpdateCode(req) => to_data(
            engine
                .update_code(
                    req.session_id,
                    CodeUpdate {
                        code: req.code,
                        language: req.language,
                    },
                )
                .await?,
        ),
        Request::StartTimer(r) => to_data(engine.start_timer(r.session_id).await?),
        Request::PauseTimer(r) => to_data(engine.pause_timer(r.session_id).await?),
        Request::UpdateTimer(req) => to_data(engine.update_timer(req.session_id, req.remaining_seconds).await?),
        Request::GetTimer(r) => to_data(engine.timer_state(r.session_id).await?),
        Request::Evaluate(r) => to_data(engine.evaluate(r.session_id).await?),
        Request::ListResults(r) => to_data(engine.results(r.session_id).await?),
        Request::Subscribe(_) | Request::Unsubscribe(_) => Err(EngineError::Validation(
            "subscriptions are handled per connection".to_string(),
        )),
    }
}
