use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Topic};
use crate::database::InterviewSession;
use crate::error::Result;
use crate::session::SessionRegistry;

/// A code-buffer edit, re-broadcast exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUpdate {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Last-writer-wins code buffer. No merging, no size checks.
pub struct CodeSync {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
}

impl CodeSync {
    pub fn new(registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>) -> Self {
        Self { registry, hub }
    }

    pub async fn update_code(&self, id: Uuid, update: CodeUpdate) -> Result<InterviewSession> {
        let mut entry = self.registry.checkout(id).await?;
        entry.code = update.code.clone();
        if let Some(language) = &update.language {
            entry.language = language.clone();
        }
        let session = entry.commit().await?;

        // the sender gets its own edit back too
        let delivered = self.hub.publish(Topic::code(id), &update);
        info!(
            "✏️ Code updated for session {} ({} bytes, {} subscribers)",
            id,
            update.code.len(),
            delivered
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, NewSession};
    use serde_json::json;

    #[tokio::test]
    async fn test_language_is_optional() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let hub = Arc::new(BroadcastHub::default());
        let session = registry
            .create(NewSession {
                question_id: Uuid::new_v4(),
                candidate_id: Uuid::new_v4(),
                interviewer_id: Uuid::new_v4(),
                language: "javascript".into(),
                code: "// start".into(),
                timer_duration: 20,
                scheduled_start_time: None,
            })
            .await
            .unwrap();
        let sync = CodeSync::new(registry, hub.clone());
        let mut code = hub.subscribe(Topic::code(session.id));

        let updated = sync
            .update_code(session.id, CodeUpdate { code: "print(1)".into(), language: Some("python".into()) })
            .await
            .unwrap();
        assert_eq!(updated.language, "python");
        assert_eq!(
            code.recv().await.unwrap().payload,
            json!({"code": "print(1)", "language": "python"})
        );

        let updated = sync
            .update_code(session.id, CodeUpdate { code: "print(2)".into(), language: None })
            .await
            .unwrap();
        assert_eq!(updated.language, "python");
        assert_eq!(code.recv().await.unwrap().payload, json!({"code": "print(2)"}));
    }

    #[tokio::test]
    async fn test_unknown_session_publishes_nothing() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())));
        let hub = Arc::new(BroadcastHub::default());
        let sync = CodeSync::new(registry, hub.clone());
        let id = Uuid::new_v4();
        let mut code = hub.subscribe(Topic::code(id));

        assert!(sync.update_code(id, CodeUpdate { code: "x".into(), language: None }).await.is_err());
        hub.publish(Topic::code(id), &json!({"ping": true}));
        assert_eq!(code.recv().await.unwrap().payload, json!({"ping": true}));
    }
}
