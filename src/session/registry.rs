use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::database::{ExecutionResult, InterviewSession, NewSession, SessionStore};
use crate::error::{EngineError, Result};

/// Sole owner of session records.
///
/// Every mutation goes through [`SessionRegistry::checkout`], which holds a
/// per-session async lock until the returned [`SessionEntry`] is dropped.
/// Mutations on one session are therefore applied one at a time while
/// different sessions never contend.
///
/// Evaluations take a second per-session lock for their whole run, so two
/// runs on one session never overlap while edits keep flowing.
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    evaluations: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            evaluations: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        slot(&self.locks, id)
    }

    /// Waits until no other evaluation of the session is running. Does not
    /// block mutations through [`SessionRegistry::checkout`].
    pub async fn exclusive_evaluation(&self, id: Uuid) -> Result<OwnedMutexGuard<()>> {
        let guard = slot(&self.evaluations, id).lock_owned().await;
        if self.store.get_session(id).await?.is_none() {
            drop(guard);
            self.evaluations.lock().remove(&id);
            return Err(EngineError::not_found("Session", id));
        }
        Ok(guard)
    }

    pub async fn create(&self, new_session: NewSession) -> Result<InterviewSession> {
        let session = new_session.into_session(Uuid::new_v4(), Utc::now());
        self.store.insert_session(&session).await.map_err(|e| {
            error!("Failed to persist new session: {}", e);
            e
        })?;
        info!("🆕 Session {} registered", session.id);
        Ok(session)
    }

    /// Unlocked read. May observe a state that a concurrent mutation is
    /// about to replace.
    pub async fn get(&self, id: Uuid) -> Result<InterviewSession> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", id))
    }

    /// Waits for exclusive access to the session and loads its current
    /// state.
    pub async fn checkout(&self, id: Uuid) -> Result<SessionEntry> {
        let guard = self.lock_for(id).lock_owned().await;
        let session = match self.store.get_session(id).await? {
            Some(session) => session,
            None => {
                drop(guard);
                self.locks.lock().remove(&id);
                return Err(EngineError::not_found("Session", id));
            }
        };
        Ok(SessionEntry {
            session,
            store: self.store.clone(),
            _guard: guard,
        })
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let removed = self.store.delete_session(id).await?;
        self.locks.lock().remove(&id);
        self.evaluations.lock().remove(&id);
        if !removed {
            return Err(EngineError::not_found("Session", id));
        }
        info!("🗑️ Session {} deleted", id);
        Ok(())
    }

    pub async fn list_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>> {
        Ok(self.store.sessions_by_candidate(candidate_id).await?)
    }

    pub async fn list_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>> {
        Ok(self.store.sessions_by_interviewer(interviewer_id).await?)
    }

    pub async fn record_result(&self, result: &ExecutionResult) -> Result<()> {
        Ok(self.store.insert_execution_result(result).await?)
    }

    pub async fn results(&self, session_id: Uuid) -> Result<Vec<ExecutionResult>> {
        // surface NotFound rather than an empty list for unknown sessions
        self.get(session_id).await?;
        Ok(self.store.execution_results(session_id).await?)
    }
}

fn slot(slots: &Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>, id: Uuid) -> Arc<AsyncMutex<()>> {
    slots
        .lock()
        .entry(id)
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Exclusive, loaded view of one session. Changes are persisted by
/// [`SessionEntry::commit`]; the lock is released on drop.
pub struct SessionEntry {
    session: InterviewSession,
    store: Arc<dyn SessionStore>,
    _guard: OwnedMutexGuard<()>,
}

impl SessionEntry {
    /// Stamps `updated_at`, writes the record and returns a snapshot. The
    /// entry stays locked so callers can publish before releasing it.
    pub async fn commit(&mut self) -> Result<InterviewSession> {
        self.session.updated_at = Utc::now();
        self.store.update_session(&self.session).await.map_err(|e| {
            error!("Failed to persist session {}: {}", self.session.id, e);
            e
        })?;
        Ok(self.session.clone())
    }
}

impl Deref for SessionEntry {
    type Target = InterviewSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for SessionEntry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use std::time::Duration;

    fn draft() -> NewSession {
        NewSession {
            question_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            interviewer_id: Uuid::new_v4(),
            language: "javascript".to_string(),
            code: String::new(),
            timer_duration: 30,
            scheduled_start_time: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_identity() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
        let a = registry.create(draft()).await.unwrap();
        let b = registry.create(draft()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(registry.get(a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
        let id = Uuid::new_v4();
        assert!(matches!(registry.get(id).await, Err(EngineError::NotFound { .. })));
        assert!(matches!(registry.checkout(id).await, Err(EngineError::NotFound { .. })));
        assert!(matches!(registry.delete(id).await, Err(EngineError::NotFound { .. })));
        assert!(matches!(registry.exclusive_evaluation(id).await, Err(EngineError::NotFound { .. })));
        assert!(registry.locks.lock().is_empty());
        assert!(registry.evaluations.lock().is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_lock_does_not_block_edits() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let session = registry.create(draft()).await.unwrap();

        let running = registry.exclusive_evaluation(session.id).await.unwrap();
        let mut entry = tokio::time::timeout(Duration::from_secs(1), registry.checkout(session.id))
            .await
            .expect("edits proceed during an evaluation")
            .unwrap();
        entry.code = "edited".into();
        entry.commit().await.unwrap();
        drop(entry);

        let second = registry.clone();
        let waiting = tokio::spawn(async move { second.exclusive_evaluation(session.id).await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        drop(running);
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let session = registry.create(draft()).await.unwrap();

        let mut tasks = Vec::new();
        for n in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut entry = registry.checkout(session.id).await.unwrap();
                let mut code = entry.code.clone();
                // widen the read-modify-write window
                tokio::time::sleep(Duration::from_millis(1)).await;
                code.push_str(&format!("{};", n));
                entry.code = code;
                entry.commit().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored = registry.get(session.id).await.unwrap();
        assert_eq!(stored.code.matches(';').count(), 32);
    }

    #[tokio::test]
    async fn test_other_sessions_are_not_blocked() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let first = registry.create(draft()).await.unwrap();
        let second = registry.create(draft()).await.unwrap();

        let _held = registry.checkout(first.id).await.unwrap();
        let entry = tokio::time::timeout(Duration::from_secs(1), registry.checkout(second.id))
            .await
            .expect("second session should not wait on the first");
        assert!(entry.is_ok());
    }

    #[tokio::test]
    async fn test_commit_stamps_updated_at() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
        let session = registry.create(draft()).await.unwrap();
        let mut entry = registry.checkout(session.id).await.unwrap();
        entry.language = "python".to_string();
        let saved = entry.commit().await.unwrap();
        drop(entry);

        assert!(saved.updated_at >= session.updated_at);
        assert_eq!(registry.get(session.id).await.unwrap().language, "python");
    }
}
