use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use log::{error, info};
use tokio_postgres::types::FromSql;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use super::models::*;
use super::{Catalog, DatabaseError, Result, SessionStore};

/// Tables owned by this engine. Users, questions and test cases belong to
/// the authoring service and are only read; they are expected to look like:
///
/// ```sql
/// users      (id UUID, name TEXT, email TEXT)
/// questions  (id UUID, title TEXT, starter_code TEXT NULL)
/// test_cases (id UUID, question_id UUID, input TEXT, expected_output TEXT NULL,
///             is_hidden BOOLEAN, points INTEGER, time_limit INTEGER NULL,
///             memory_limit INTEGER NULL, description TEXT NULL,
///             created_at TIMESTAMPTZ)
/// ```
///
/// Any other column type (text ids, a plain `TIMESTAMP`) or an unexpected
/// NULL surfaces as `DatabaseError::CorruptRow`.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS interview_sessions (
    id                   UUID PRIMARY KEY,
    question_id          UUID,
    candidate_id         UUID NOT NULL,
    interviewer_id       UUID NOT NULL,
    language             TEXT NOT NULL,
    code                 TEXT NOT NULL DEFAULT '',
    status               TEXT NOT NULL,
    scheduled_start_time TIMESTAMPTZ,
    actual_start_time    TIMESTAMPTZ,
    end_time             TIMESTAMPTZ,
    timer_duration       INTEGER NOT NULL,
    timer_remaining      INTEGER NOT NULL,
    timer_status         TEXT NOT NULL,
    interviewer_feedback TEXT,
    rating               INTEGER,
    score                DOUBLE PRECISION,
    created_at           TIMESTAMPTZ NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS interview_sessions_candidate_idx ON interview_sessions (candidate_id);
CREATE INDEX IF NOT EXISTS interview_sessions_interviewer_idx ON interview_sessions (interviewer_id);

CREATE TABLE IF NOT EXISTS execution_results (
    id                 UUID PRIMARY KEY,
    seq                BIGSERIAL,
    session_id         UUID NOT NULL,
    test_case_id       UUID NOT NULL,
    passed             BOOLEAN NOT NULL,
    actual_output      TEXT,
    error_message      TEXT,
    stdout             TEXT NOT NULL,
    stderr             TEXT NOT NULL,
    compile_output     TEXT NOT NULL,
    status_description TEXT,
    executed_at        TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS execution_results_session_idx ON execution_results (session_id);
"#;

const SESSION_COLUMNS: &str = "id, question_id, candidate_id, interviewer_id, language, code, status, \
     scheduled_start_time, actual_start_time, end_time, timer_duration, timer_remaining, \
     timer_status, interviewer_feedback, rating, score, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(database_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Pool creation failed: {}", e)))?;

        // Test connection
        let _client = pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Connection test failed: {}", e)))?;

        info!("Database connection established successfully");
        Ok(PostgresStore { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA).await.map_err(|e| {
            error!("Failed to apply schema: {}", e);
            DatabaseError::QueryFailed(format!("Failed to apply schema: {}", e))
        })?;
        info!("Engine tables are up to date");
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }

    async fn query_sessions(&self, column: &str, value: Uuid) -> Result<Vec<InterviewSession>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM interview_sessions WHERE {} = $1 ORDER BY created_at",
            SESSION_COLUMNS, column
        );
        let rows = client.query(sql.as_str(), &[&value]).await.map_err(|e| {
            error!("Failed to list sessions by {}: {}", column, e);
            DatabaseError::QueryFailed(format!("Failed to list sessions: {}", e))
        })?;
        rows.iter().map(session_from_row).collect()
    }
}

/// Reads one column, reporting NULLs and type mismatches as corrupt rows.
fn column<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<T> {
    row.try_get(idx).map_err(|e| {
        let name = row.columns().get(idx).map(|c| c.name()).unwrap_or("?");
        error!("Unreadable column {} ({}): {}", idx, name, e);
        DatabaseError::CorruptRow(format!("column {} ({}): {}", idx, name, e))
    })
}

fn session_from_row(row: &Row) -> Result<InterviewSession> {
    let status: String = column(row, 6)?;
    let timer_status: String = column(row, 12)?;
    Ok(InterviewSession {
        id: column(row, 0)?,
        question_id: column(row, 1)?,
        candidate_id: column(row, 2)?,
        interviewer_id: column(row, 3)?,
        language: column(row, 4)?,
        code: column(row, 5)?,
        status: status.parse().map_err(DatabaseError::CorruptRow)?,
        scheduled_start_time: column(row, 7)?,
        actual_start_time: column(row, 8)?,
        end_time: column(row, 9)?,
        timer_duration: column(row, 10)?,
        timer_remaining: column(row, 11)?,
        timer_status: timer_status.parse().map_err(DatabaseError::CorruptRow)?,
        interviewer_feedback: column(row, 13)?,
        rating: column(row, 14)?,
        score: column(row, 15)?,
        created_at: column(row, 16)?,
        updated_at: column(row, 17)?,
    })
}

fn result_from_row(row: &Row) -> Result<ExecutionResult> {
    Ok(ExecutionResult {
        id: column(row, 0)?,
        session_id: column(row, 1)?,
        test_case_id: column(row, 2)?,
        passed: column(row, 3)?,
        actual_output: column(row, 4)?,
        error_message: column(row, 5)?,
        stdout: column(row, 6)?,
        stderr: column(row, 7)?,
        compile_output: column(row, 8)?,
        status_description: column(row, 9)?,
        executed_at: column(row, 10)?,
    })
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: column(row, 0)?,
        name: column(row, 1)?,
        email: column(row, 2)?,
    })
}

fn question_from_row(row: &Row) -> Result<Question> {
    Ok(Question {
        id: column(row, 0)?,
        title: column(row, 1)?,
        starter_code: column(row, 2)?,
    })
}

fn test_case_from_row(row: &Row) -> Result<TestCase> {
    Ok(TestCase {
        id: column(row, 0)?,
        question_id: column(row, 1)?,
        input: column(row, 2)?,
        expected_output: column(row, 3)?,
        is_hidden: column(row, 4)?,
        points: column(row, 5)?,
        time_limit: column(row, 6)?,
        memory_limit: column(row, 7)?,
        description: column(row, 8)?,
        created_at: column(row, 9)?,
    })
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn insert_session(&self, session: &InterviewSession) -> Result<()> {
        let client = self.client().await?;
        let sql = format!(
            "INSERT INTO interview_sessions ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            SESSION_COLUMNS
        );
        client
            .execute(
                sql.as_str(),
                &[
                    &session.id,
                    &session.question_id,
                    &session.candidate_id,
                    &session.interviewer_id,
                    &session.language,
                    &session.code,
                    &session.status.as_str(),
                    &session.scheduled_start_time,
                    &session.actual_start_time,
                    &session.end_time,
                    &session.timer_duration,
                    &session.timer_remaining,
                    &session.timer_status.as_str(),
                    &session.interviewer_feedback,
                    &session.rating,
                    &session.score,
                    &session.created_at,
                    &session.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert session {}: {}", session.id, e);
                DatabaseError::QueryFailed(format!("Failed to insert session: {}", e))
            })?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<InterviewSession>> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM interview_sessions WHERE id = $1", SESSION_COLUMNS);
        let row = client.query_opt(sql.as_str(), &[&id]).await.map_err(|e| {
            error!("Failed to fetch session {}: {}", id, e);
            DatabaseError::QueryFailed(format!("Failed to fetch session: {}", e))
        })?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn update_session(&self, session: &InterviewSession) -> Result<()> {
        let client = self.client().await?;
        let rows_affected = client
            .execute(
                r#"
                UPDATE interview_sessions
                SET language = $2, code = $3, status = $4,
                    actual_start_time = $5, end_time = $6,
                    timer_remaining = $7, timer_status = $8,
                    interviewer_feedback = $9, rating = $10, score = $11,
                    updated_at = $12
                WHERE id = $1
                "#,
                &[
                    &session.id,
                    &session.language,
                    &session.code,
                    &session.status.as_str(),
                    &session.actual_start_time,
                    &session.end_time,
                    &session.timer_remaining,
                    &session.timer_status.as_str(),
                    &session.interviewer_feedback,
                    &session.rating,
                    &session.score,
                    &session.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to update session {}: {}", session.id, e);
                DatabaseError::QueryFailed(format!("Failed to update session: {}", e))
            })?;

        if rows_affected == 0 {
            return Err(DatabaseError::QueryFailed(format!("no session row {}", session.id)));
        }
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool> {
        let client = self.client().await?;
        let rows_affected = client
            .execute("DELETE FROM interview_sessions WHERE id = $1", &[&id])
            .await
            .map_err(|e| {
                error!("Failed to delete session {}: {}", id, e);
                DatabaseError::QueryFailed(format!("Failed to delete session: {}", e))
            })?;
        Ok(rows_affected > 0)
    }

    async fn sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.query_sessions("candidate_id", candidate_id).await
    }

    async fn sessions_by_interviewer(&self, interviewer_id: Uuid) -> Result<Vec<InterviewSession>> {
        self.query_sessions("interviewer_id", interviewer_id).await
    }

    async fn insert_execution_result(&self, result: &ExecutionResult) -> Result<()> {
        let client = self.client().await?;
        client
            .execute(
                r#"
                INSERT INTO execution_results
                (id, session_id, test_case_id, passed, actual_output, error_message,
                 stdout, stderr, compile_output, status_description, executed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
                &[
                    &result.id,
                    &result.session_id,
                    &result.test_case_id,
                    &result.passed,
                    &result.actual_output,
                    &result.error_message,
                    &result.stdout,
                    &result.stderr,
                    &result.compile_output,
                    &result.status_description,
                    &result.executed_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert execution result for session {}: {}", result.session_id, e);
                DatabaseError::QueryFailed(format!("Failed to insert execution result: {}", e))
            })?;
        Ok(())
    }

    async fn execution_results(&self, session_id: Uuid) -> Result<Vec<ExecutionResult>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT id, session_id, test_case_id, passed, actual_output, error_message,
                       stdout, stderr, compile_output, status_description, executed_at
                FROM execution_results
                WHERE session_id = $1
                ORDER BY executed_at DESC, seq DESC
                "#,
                &[&session_id],
            )
            .await
            .map_err(|e| {
                error!("Failed to fetch execution results for session {}: {}", session_id, e);
                DatabaseError::QueryFailed(format!("Failed to fetch execution results: {}", e))
            })?;
        rows.iter().map(result_from_row).collect()
    }
}

#[async_trait]
impl Catalog for PostgresStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id, name, email FROM users WHERE id = $1", &[&id])
            .await
            .map_err(|e| {
                error!("Failed to fetch user {}: {}", id, e);
                DatabaseError::QueryFailed(format!("Failed to fetch user: {}", e))
            })?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id, title, starter_code FROM questions WHERE id = $1", &[&id])
            .await
            .map_err(|e| {
                error!("Failed to fetch question {}: {}", id, e);
                DatabaseError::QueryFailed(format!("Failed to fetch question: {}", e))
            })?;
        row.as_ref().map(question_from_row).transpose()
    }

    async fn test_cases_for(&self, question_id: Uuid) -> Result<Vec<TestCase>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT id, question_id, input, expected_output, is_hidden, points,
                       time_limit, memory_limit, description, created_at
                FROM test_cases
                WHERE question_id = $1
                "#,
                &[&question_id],
            )
            .await
            .map_err(|e| {
                error!("Failed to fetch test cases for question {}: {}", question_id, e);
                DatabaseError::QueryFailed(format!("Failed to fetch test cases: {}", e))
            })?;

        rows.iter().map(test_case_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs a disposable Postgres; skipped unless `LIVECODE_TEST_DATABASE_URL` is set.
    async fn test_store() -> Option<PostgresStore> {
        let url = std::env::var("LIVECODE_TEST_DATABASE_URL").ok()?;
        Some(PostgresStore::connect(&url).await.unwrap())
    }

    #[tokio::test]
    async fn test_foreign_timestamp_column_is_a_corrupt_row() {
        let Some(store) = test_store().await else {
            return;
        };
        let question_id = Uuid::new_v4();
        let client = store.client().await.unwrap();
        // temp tables shadow permanent ones for this connection only
        client
            .batch_execute(
                r#"
                CREATE TEMP TABLE test_cases (
                    id UUID, question_id UUID, input TEXT, expected_output TEXT,
                    is_hidden BOOLEAN, points INTEGER, time_limit INTEGER,
                    memory_limit INTEGER, description TEXT, created_at TIMESTAMP
                )
                "#,
            )
            .await
            .unwrap();
        client
            .execute(
                "INSERT INTO test_cases VALUES ($1, $2, '1 2', '3', false, 10, NULL, NULL, NULL, now())",
                &[&Uuid::new_v4(), &question_id],
            )
            .await
            .unwrap();

        let rows = client
            .query(
                "SELECT id, question_id, input, expected_output, is_hidden, points, \
                 time_limit, memory_limit, description, created_at FROM test_cases WHERE question_id = $1",
                &[&question_id],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        match test_case_from_row(&rows[0]) {
            Err(DatabaseError::CorruptRow(message)) => assert!(message.contains("created_at")),
            other => panic!("expected a corrupt row, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_null_is_a_corrupt_row() {
        let Some(store) = test_store().await else {
            return;
        };
        let client = store.client().await.unwrap();
        let row = client
            .query_one("SELECT gen_random_uuid(), NULL::TEXT, 'a@example.com'::TEXT", &[])
            .await
            .unwrap();
        assert!(matches!(user_from_row(&row), Err(DatabaseError::CorruptRow(_))));
    }
}
