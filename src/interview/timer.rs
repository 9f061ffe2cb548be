use std::sync::Arc;

use serde::{Deserialize, Serialize};
use log::info;
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Topic};
use crate::database::{InterviewSession, TimerStatus};
use crate::error::{EngineError, Result};
use crate::session::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Start,
    Pause,
    Update { seconds: i32 },
}

impl TimerAction {
    fn as_str(&self) -> &'static str {
        match self {
            TimerAction::Start => "start",
            TimerAction::Pause => "pause",
            TimerAction::Update { .. } => "update",
        }
    }
}

/// Legal timer status changes. `Expired` is terminal except that a
/// non-positive update keeps it expired.
pub fn transition(from: TimerStatus, action: TimerAction) -> Result<TimerStatus> {
    use TimerStatus::*;

    let next = match (from, action) {
        (_, TimerAction::Update { seconds }) if seconds <= 0 => Expired,
        (Expired, _) => {
            return Err(EngineError::InvalidTransition {
                state: from.to_string(),
                action: action.as_str(),
            })
        }
        (_, TimerAction::Start) => Running,
        (_, TimerAction::Pause) => Paused,
        (current, TimerAction::Update { .. }) => current,
    };
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerEventKind {
    Start,
    Pause,
    Update,
    Expire,
}

/// Payload on a session's timer topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEvent {
    pub action: TimerEventKind,
    pub remaining: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub session_id: Uuid,
    pub status: TimerStatus,
    pub remaining_seconds: i32,
    pub duration_minutes: i32,
}

impl From<&InterviewSession> for TimerState {
    fn from(session: &InterviewSession) -> Self {
        TimerState {
            session_id: session.id,
            status: session.timer_status,
            remaining_seconds: session.timer_remaining,
            duration_minutes: session.timer_duration,
        }
    }
}

/// Countdown bookkeeping. There is no server-side clock: clients push the
/// remaining time and the service persists and re-broadcasts it.
pub struct TimerService {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
}

impl TimerService {
    pub fn new(registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>) -> Self {
        Self { registry, hub }
    }

    pub async fn start_timer(&self, id: Uuid) -> Result<InterviewSession> {
        info!("⏱️ Starting interview timer for session: {}", id);
        let mut entry = self.registry.checkout(id).await?;
        entry.timer_status = transition(entry.timer_status, TimerAction::Start)?;
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::timer(id),
            &TimerEvent {
                action: TimerEventKind::Start,
                remaining: session.timer_remaining,
            },
        );
        Ok(session)
    }

    pub async fn pause_timer(&self, id: Uuid) -> Result<InterviewSession> {
        info!("⏸️ Pausing interview timer for session: {}", id);
        let mut entry = self.registry.checkout(id).await?;
        entry.timer_status = transition(entry.timer_status, TimerAction::Pause)?;
        let session = entry.commit().await?;

        self.hub.publish(
            Topic::timer(id),
            &TimerEvent {
                action: TimerEventKind::Pause,
                remaining: session.timer_remaining,
            },
        );
        Ok(session)
    }

    /// Any `seconds <= 0` expires the timer whatever its state; negative
    /// values are stored as zero.
    pub async fn update_remaining(&self, id: Uuid, seconds: i32) -> Result<InterviewSession> {
        let mut entry = self.registry.checkout(id).await?;
        let next = transition(entry.timer_status, TimerAction::Update { seconds })?;
        let expired_now = next == TimerStatus::Expired && entry.timer_status != TimerStatus::Expired;
        entry.timer_status = next;
        entry.timer_remaining = seconds.max(0);
        let session = entry.commit().await?;

        if expired_now {
            info!("⌛ Timer expired for session: {}", id);
        }
        let action = if next == TimerStatus::Expired {
            TimerEventKind::Expire
        } else {
            TimerEventKind::Update
        };
        self.hub.publish(
            Topic::timer(id),
            &TimerEvent {
                action,
                remaining: session.timer_remaining,
            },
        );
        Ok(session)
    }

    pub async fn get_timer_state(&self, id: Uuid) -> Result<TimerState> {
        let session = self.registry.get(id).await?;
        Ok(TimerState::from(&session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, NewSession};
    use serde_json::json;
    use TimerStatus::*;

    #[test]
    fn test_zero_update_expires_from_any_state() {
        for from in [NotStarted, Running, Paused, Expired] {
            assert_eq!(transition(from, TimerAction::Update { seconds: 0 }).unwrap(), Expired);
            assert_eq!(transition(from, TimerAction::Update { seconds: -3 }).unwrap(), Expired);
        }
    }

    #[test]
    fn test_start_and_pause_transitions() {
        assert_eq!(transition(NotStarted, TimerAction::Start).unwrap(), Running);
        assert_eq!(transition(Paused, TimerAction::Start).unwrap(), Running);
        assert_eq!(transition(Running, TimerAction::Pause).unwrap(), Paused);
        assert_eq!(transition(NotStarted, TimerAction::Pause).unwrap(), Paused);
        assert_eq!(transition(Running, TimerAction::Update { seconds: 30 }).unwrap(), Running);
    }

    #[test]
    fn test_expired_is_terminal() {
        assert!(transition(Expired, TimerAction::Start).is_err());
        assert!(transition(Expired, TimerAction::Pause).is_err());
        assert!(transition(Expired, TimerAction::Update { seconds: 10 }).is_err());
    }

    async fn service() -> (TimerService, Arc<BroadcastHub>, Uuid) {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let hub = Arc::new(BroadcastHub::default());
        let session = registry
            .create(NewSession {
                question_id: Uuid::new_v4(),
                candidate_id: Uuid::new_v4(),
                interviewer_id: Uuid::new_v4(),
                language: "javascript".into(),
                code: String::new(),
                timer_duration: 30,
                scheduled_start_time: None,
            })
            .await
            .unwrap();
        (TimerService::new(registry, hub.clone()), hub, session.id)
    }

    #[tokio::test]
    async fn test_start_then_pause_keeps_remaining() {
        let (timer, hub, id) = service().await;
        let mut events = hub.subscribe(Topic::timer(id));

        let started = timer.start_timer(id).await.unwrap();
        assert_eq!(started.timer_status, Running);
        let paused = timer.pause_timer(id).await.unwrap();
        assert_eq!(paused.timer_status, Paused);
        assert_eq!(paused.timer_remaining, 1800);

        assert_eq!(events.recv().await.unwrap().payload, json!({"action": "start", "remaining": 1800}));
        assert_eq!(events.recv().await.unwrap().payload, json!({"action": "pause", "remaining": 1800}));
    }

    #[tokio::test]
    async fn test_update_to_zero_expires_and_broadcasts() {
        let (timer, hub, id) = service().await;
        timer.start_timer(id).await.unwrap();
        let mut events = hub.subscribe(Topic::timer(id));

        let ticked = timer.update_remaining(id, 95).await.unwrap();
        assert_eq!(ticked.timer_status, Running);
        assert_eq!(ticked.timer_remaining, 95);

        let expired = timer.update_remaining(id, -5).await.unwrap();
        assert_eq!(expired.timer_status, Expired);
        assert_eq!(expired.timer_remaining, 0);

        // repeated expiry stays expired
        let again = timer.update_remaining(id, 0).await.unwrap();
        assert_eq!(again.timer_status, Expired);

        assert_eq!(events.recv().await.unwrap().payload, json!({"action": "update", "remaining": 95}));
        assert_eq!(events.recv().await.unwrap().payload, json!({"action": "expire", "remaining": 0}));

        let state = timer.get_timer_state(id).await.unwrap();
        assert_eq!(state.status, Expired);
        assert_eq!(state.duration_minutes, 30);
        assert!(timer.start_timer(id).await.is_err());
    }
}
