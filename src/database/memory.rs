use async_trait::async_trait;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use super::models::*;
use super::{Catalog, DatabaseError, Result, SessionStore};

/// Fixture format for populating the in-memory catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl CatalogSeed {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::Seed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| DatabaseError::Seed(format!("{}: {}", path.display(), e)))
    }
}

/// Process-local backend for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, InterviewSession>>,
    results: RwLock<HashMap<Uuid, Vec<ExecutionResult>>>,
    users: RwLock<HashMap<Uuid, User>>,
    questions: RwLock<HashMap<Uuid, Question>>,
    test_cases: RwLock<Vec<TestCase>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: CatalogSeed) -> Self {
        let store = Self::new();
        info!(
            "🌱 Seeding catalog: {} users, {} questions, {} test cases",
            seed.users.len(),
            seed.questions.len(),
            seed.test_cases.len()
        );
        for user in seed.users {
            store.add_user(user);
        }
        for question in seed.questions {
            store.add_question(question);
        }
        for case in seed.test_cases {
            store.add_test_case(case);
        }
        store
    }

    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.id, user);
    }

    pub fn add_question(&self, question: Question) {
        self.questions.write().insert(question.id, question);
    }

    pub fn add_test_case(&self, case: TestCase) {
        self.test_cases.write().push(case);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &InterviewSession) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(DatabaseError::QueryFailed(format!("duplicate session id {}", session.id)));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<InterviewSession>> {
        Ok(self.sessions.read().get(&id).cloned())
    }

    async fn update_session(&self, session: &InterviewSession) -> Result<()> {
        match self.sessions.write().get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(DatabaseError::QueryFailed(format!("no session row {}", session.id))),
        }
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool> {
        Ok(self.sessions.write().remove(&id).is_some())
    }

    async fn sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>> {
        let mut found: Vec<InterviewSession> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.candidate_id == candidate_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn sessions_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>> {
        let mut found: Vec<InterviewSession> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.interviewer_id == interviewer_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn insert_execution_result(&self, result: &ExecutionResult) -> Result<()> {
        self.results
            .write()
            .entry(result.session_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn execution_results(&self, session_id: Uuid) -> Result<Vec<ExecutionResult>> {
        let mut rows: Vec<ExecutionResult> = self
            .results
            .read()
            .get(&session_id)
            .map(|rows| rows.iter().rev().cloned().collect())
            .unwrap_or_default();
        // stable, so equal timestamps keep newest-inserted first
        rows.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(rows)
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        Ok(self.questions.read().get(&id).cloned())
    }

    async fn test_cases_for(&self, question_id: Uuid) -> Result<Vec<TestCase>> {
        Ok(self
            .test_cases
            .read()
            .iter()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn result(session_id: Uuid, executed_at: chrono::DateTime<Utc>) -> ExecutionResult {
        ExecutionResult {
            id: Uuid::new_v4(),
            session_id,
            test_case_id: Uuid::new_v4(),
            passed: true,
            actual_output: Some("ok".into()),
            error_message: None,
            stdout: "ok".into(),
            stderr: String::new(),
            compile_output: String::new(),
            status_description: Some("Accepted".into()),
            executed_at,
        }
    }

    #[tokio::test]
    async fn test_results_are_newest_first() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let older = result(session_id, now - Duration::seconds(5));
        let tie_a = result(session_id, now);
        let tie_b = result(session_id, now);

        store.insert_execution_result(&older).await.unwrap();
        store.insert_execution_result(&tie_a).await.unwrap();
        store.insert_execution_result(&tie_b).await.unwrap();

        let rows = store.execution_results(session_id).await.unwrap();
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![tie_b.id, tie_a.id, older.id]);
        assert!(store.execution_results(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let store = MemoryStore::new();
        let session = crate::database::NewSession {
            question_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            interviewer_id: Uuid::new_v4(),
            language: "python".into(),
            code: String::new(),
            timer_duration: 30,
            scheduled_start_time: None,
        }
        .into_session(Uuid::new_v4(), Utc::now());

        assert!(store.update_session(&session).await.is_err());
        store.insert_session(&session).await.unwrap();
        assert!(store.insert_session(&session).await.is_err());
        assert!(store.delete_session(session.id).await.unwrap());
        assert!(!store.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_fixture_parses() {
        let question_id = Uuid::new_v4();
        let seed: CatalogSeed = serde_json::from_value(serde_json::json!({
            "users": [{"id": Uuid::new_v4(), "name": "Ada", "email": "ada@example.com"}],
            "questions": [{"id": question_id, "title": "Sum", "starterCode": "// sum"}],
            "testCases": [{"id": Uuid::new_v4(), "questionId": question_id, "input": "1 2", "expectedOutput": "3", "points": 5}]
        }))
        .unwrap();
        let store = MemoryStore::seeded(seed);

        let question = store.get_question(question_id).await.unwrap().unwrap();
        assert_eq!(question.starter_code.as_deref(), Some("// sum"));
        let cases = store.test_cases_for(question_id).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].points, 5);
    }
}
