use std::sync::Arc;

use log::info;
use uuid::Uuid;

use super::code::{CodeSync, CodeUpdate};
use super::evaluation::{EvaluationReport, Evaluator, StdinSource};
use super::timer::{TimerService, TimerState};
use crate::broadcast::{BroadcastHub, Subscription, Topic};
use crate::database::{Catalog, ExecutionResult, InterviewSession, SessionStore};
use crate::error::Result;
use crate::execution::Executor;
use crate::session::{CreateSession, SessionManager, SessionRegistry};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub default_language: String,
    pub broadcast_capacity: usize,
    pub stdin: StdinSource,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_language: "javascript".to_string(),
            broadcast_capacity: 256,
            stdin: StdinSource::Empty,
        }
    }
}

/// One handle over every live-session service, sharing a single hub and
/// registry so that all of them serialize on the same per-session lock.
pub struct InterviewEngine {
    hub: Arc<BroadcastHub>,
    sessions: SessionManager,
    timer: TimerService,
    code: CodeSync,
    evaluator: Evaluator,
}

impl InterviewEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn Catalog>,
        executor: Arc<dyn Executor>,
        options: EngineOptions,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(options.broadcast_capacity));
        let registry = Arc::new(SessionRegistry::new(store));

        info!(
            "🚀 Interview engine ready (default language: {}, stdin: {:?})",
            options.default_language, options.stdin
        );

        Self {
            sessions: SessionManager::new(registry.clone(), catalog.clone(), hub.clone(), options.default_language),
            timer: TimerService::new(registry.clone(), hub.clone()),
            code: CodeSync::new(registry.clone(), hub.clone()),
            evaluator: Evaluator::new(registry, catalog, executor, hub.clone(), options.stdin),
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.hub.subscribe(topic)
    }

    pub async fn create_session(&self, request: CreateSession) -> Result<InterviewSession> {
        self.sessions.create(request).await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<InterviewSession> {
        self.sessions.get(id).await
    }

    pub async fn sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.sessions.list_by_candidate(candidate_id).await
    }

    pub async fn sessions_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.sessions.list_by_interviewer(interviewer_id).await
    }

    pub async fn start_session(&self, id: Uuid) -> Result<InterviewSession> {
        self.sessions.start(id).await
    }

    pub async fn end_session(&self, id: Uuid) -> Result<InterviewSession> {
        self.sessions.end(id).await
    }

    pub async fn cancel_session(&self, id: Uuid) -> Result<InterviewSession> {
        self.sessions.cancel(id).await
    }

    pub async fn add_feedback(&self, id: Uuid, feedback: String, rating: i32) -> Result<InterviewSession> {
        self.sessions.add_feedback(id, feedback, rating).await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.sessions.delete(id).await
    }

    pub async fn update_code(&self, id: Uuid, update: CodeUpdate) -> Result<InterviewSession> {
        self.code.update_code(id, update).await
    }

    pub async fn start_timer(&self, id: Uuid) -> Result<InterviewSession> {
        self.timer.start_timer(id).await
    }

    pub async fn pause_timer(&self, id: Uuid) -> Result<InterviewSession> {
        self.timer.pause_timer(id).await
    }

    pub async fn update_timer(&self, id: Uuid, remaining_seconds: i32) -> Result<InterviewSession> {
        self.timer.update_remaining(id, remaining_seconds).await
    }

    pub async fn timer_state(&self, id: Uuid) -> Result<TimerState> {
        self.timer.get_timer_state(id).await
    }

    pub async fn evaluate(&self, id: Uuid) -> Result<EvaluationReport> {
        self.evaluator.evaluate(id).await
    }

    pub async fn results(&self, id: Uuid) -> Result<Vec<ExecutionResult>> {
        self.evaluator.list_results(id).await
    }
}
