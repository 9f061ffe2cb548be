pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::{CatalogSeed, MemoryStore};
pub use models::*;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    #[error("Seed file error: {0}")]
    Seed(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Persistence for interview sessions and their execution results.
///
/// Implementations are plain storage: they perform no locking beyond what
/// their backend needs. Serialization of concurrent mutations on one session
/// is the job of [`crate::session::SessionRegistry`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &InterviewSession) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Option<InterviewSession>>;
    /// Overwrites every mutable column of an existing row.
    async fn update_session(&self, session: &InterviewSession) -> Result<()>;
    /// Returns whether a row was removed.
    async fn delete_session(&self, id: Uuid) -> Result<bool>;
    async fn sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>>;
    async fn sessions_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>>;

    async fn insert_execution_result(&self, result: &ExecutionResult) -> Result<()>;
    /// Newest first.
    async fn execution_results(&self, session_id: Uuid) -> Result<Vec<ExecutionResult>>;
}

/// Read-only view of data owned by external collaborators.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_question(&self, id: Uuid) -> Result<Option<Question>>;
    /// No ordering guarantee.
    async fn test_cases_for(&self, question_id: Uuid) -> Result<Vec<TestCase>>;
}
