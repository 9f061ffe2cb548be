use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::{transition, SessionAction};
use super::registry::SessionRegistry;
use crate::broadcast::{BroadcastHub, Topic};
use crate::database::{Catalog, InterviewSession, NewSession, SessionStatus};
use crate::error::{EngineError, Result};

/// Payload on a session's status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub question_id: Uuid,
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    pub timer_duration_minutes: i32,
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

/// Session status machine: scheduling, start, end, review, cancel.
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    catalog: Arc<dyn Catalog>,
    hub: Arc<BroadcastHub>,
    default_language: String,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        catalog: Arc<dyn Catalog>,
        hub: Arc<BroadcastHub>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            catalog,
            hub,
            default_language: default_language.into(),
        }
    }

    pub async fn create(&self, request: CreateSession) -> Result<InterviewSession> {
        info!("📅 Scheduling session for question {}", request.question_id);

        let question = self
            .catalog
            .get_question(request.question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Question", request.question_id))?;
        self.catalog
            .get_user(request.candidate_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Candidate", request.candidate_id))?;
        self.catalog
            .get_user(request.interviewer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Interviewer", request.interviewer_id))?;

        let session = self
            .registry
            .create(NewSession {
                question_id: question.id,
                candidate_id: request.candidate_id,
                interviewer_id: request.interviewer_id,
                language: self.default_language.clone(),
                code: question.starter_code.unwrap_or_default(),
                timer_duration: request.timer_duration_minutes,
                scheduled_start_time: request.scheduled_start_time,
            })
            .await?;

        info!("✅ Session {} scheduled ({} min)", session.id, session.timer_duration);
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<InterviewSession> {
        self.registry.get(id).await
    }

    pub async fn list_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.registry.list_by_candidate(candidate_id).await
    }

    pub async fn list_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.registry.list_by_interviewer(interviewer_id).await
    }

    /// Not idempotent: every call re-stamps `actual_start_time`.
    pub async fn start(&self, id: Uuid) -> Result<InterviewSession> {
        info!("🚀 Starting session: {}", id);
        let mut entry = self.registry.checkout(id).await?;
        entry.status = transition(entry.status, SessionAction::Start)?;
        entry.actual_start_time = Some(Utc::now());
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::status(id),
            &StatusChanged {
                status: session.status,
                start_time: session.actual_start_time,
                end_time: None,
            },
        );
        Ok(session)
    }

    pub async fn end(&self, id: Uuid) -> Result<InterviewSession> {
        info!("⏹️ Ending session: {}", id);
        let mut entry = self.registry.checkout(id).await?;
        entry.status = transition(entry.status, SessionAction::End)?;
        entry.end_time = Some(Utc::now());
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::status(id),
            &StatusChanged {
                status: session.status,
                start_time: None,
                end_time: session.end_time,
            },
        );
        Ok(session)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<InterviewSession> {
        info!("🚫 Cancelling session: {}", id);
        let mut entry = self.registry.checkout(id).await?;
        entry.status = transition(entry.status, SessionAction::Cancel)?;
        entry.end_time = Some(Utc::now());
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::status(id),
            &StatusChanged {
                status: session.status,
                start_time: None,
                end_time: session.end_time,
            },
        );
        Ok(session)
    }

    /// Rating bounds are the caller's contract; the value is stored as given.
    pub async fn add_feedback(&self, id: Uuid, feedback: String, rating: i32) -> Result<InterviewSession> {
        info!("📝 Recording feedback for session: {}", id);
        if !(1..=5).contains(&rating) {
            warn!("Rating {} for session {} is outside 1-5", rating, id);
        }

        let mut entry = self.registry.checkout(id).await?;
        entry.status = transition(entry.status, SessionAction::Review)?;
        entry.interviewer_feedback = Some(feedback);
        entry.rating = Some(rating);
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::status(id),
            &StatusChanged {
                status: session.status,
                start_time: None,
                end_time: None,
            },
        );
        Ok(session)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.registry.delete(id).await?;
        self.hub.close_session(id);
        Ok(())
    }
}
