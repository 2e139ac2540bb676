//! crates/smoker_core/src/sessions.rs
//!
//! Records smoking sessions in the `smokingSessions` collection. Unlike the
//! sensor read paths, every failure here is logged and handed back to the
//! caller: a lost session write has to be surfaced.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    strip_reserved, NewSession, SessionDraft, SessionStatus, SessionUpdate, SmokingSession,
    SESSION_FIELDS,
};
use crate::ports::{DocumentStore, PortResult};

#[derive(Clone)]
pub struct SessionRecorder {
    store: Arc<dyn DocumentStore>,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Creates a new active session. The caller is responsible for making sure
    /// no other session is still active. Extra fields named like a session
    /// field are dropped.
    pub async fn start_session(&self, mut request: NewSession) -> PortResult<SmokingSession> {
        info!(duration = request.duration, admin_id = ?request.admin_id, "Starting new session");
        drop_shadowing_fields(&mut request.extra);
        let draft = SessionDraft {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            target_duration: request.duration,
            current_duration: 0,
            temperature_data: Vec::new(),
            smoke_level_data: Vec::new(),
            timestamps: Vec::new(),
            started_by: request.admin_id.clone(),
            last_updated_by: request.admin_id,
            extra: request.extra,
        };

        let session = self.store.create_session(draft).await.map_err(|e| {
            error!("Error starting session: {:?}", e);
            e
        })?;
        info!(session_id = %session.id, "Session started successfully");
        Ok(session)
    }

    /// The first session whose status is `active`, if any.
    pub async fn active_session(&self) -> PortResult<Option<SmokingSession>> {
        let sessions = self
            .store
            .sessions_with_status(SessionStatus::Active)
            .await
            .map_err(|e| {
                error!("Error fetching active session: {:?}", e);
                e
            })?;
        Ok(sessions.into_iter().next())
    }

    pub async fn update_session(&self, session_id: Uuid, mut update: SessionUpdate) -> PortResult<()> {
        info!(%session_id, "Updating session");
        drop_shadowing_fields(&mut update.extra);
        self.store
            .update_session(session_id, update)
            .await
            .map_err(|e| {
                error!(%session_id, "Error updating session: {:?}", e);
                e
            })
    }

    pub async fn end_session(&self, session_id: Uuid, admin_id: &str) -> PortResult<()> {
        info!(%session_id, %admin_id, "Ending session");
        self.store
            .complete_session(session_id, admin_id)
            .await
            .map_err(|e| {
                error!(%session_id, "Error ending session: {:?}", e);
                e
            })
    }

    /// Every completed session.
    pub async fn session_history(&self) -> PortResult<Vec<SmokingSession>> {
        self.store
            .sessions_with_status(SessionStatus::Completed)
            .await
            .map_err(|e| {
                error!("Error fetching session history: {:?}", e);
                e
            })
    }
}

fn drop_shadowing_fields(extra: &mut serde_json::Map<String, serde_json::Value>) {
    let dropped = strip_reserved(extra, SESSION_FIELDS);
    if !dropped.is_empty() {
        warn!(?dropped, "Ignoring caller fields that shadow session fields");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn recorder() -> (SessionRecorder, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (SessionRecorder::new(store.clone()), store)
    }

    fn new_session(duration: i64, admin_id: &str) -> NewSession {
        NewSession {
            duration,
            admin_id: Some(admin_id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_then_end_lands_in_history() {
        let (sessions, _) = recorder();

        let started = sessions.start_session(new_session(1800, "admin1")).await.unwrap();
        assert_eq!(started.status, SessionStatus::Active);
        assert_eq!(started.target_duration, 1800);
        assert_eq!(started.current_duration, 0);
        assert_eq!(started.started_by.as_deref(), Some("admin1"));
        assert_eq!(started.last_updated_by.as_deref(), Some("admin1"));
        assert!(started.temperature_data.is_empty());
        assert!(started.smoke_level_data.is_empty());
        assert!(started.timestamps.is_empty());
        assert!(started.end_time.is_none());

        let active = sessions.active_session().await.unwrap().expect("active session");
        assert_eq!(active.id, started.id);

        sessions.end_session(started.id, "admin1").await.unwrap();

        assert!(sessions.active_session().await.unwrap().is_none());
        let history = sessions.session_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, started.id);
        assert_eq!(history[0].status, SessionStatus::Completed);
        assert!(history[0].end_time.is_some());
    }

    #[tokio::test]
    async fn caller_fields_are_kept() {
        let (sessions, _) = recorder();
        let mut request = new_session(600, "admin1");
        request.extra.insert("meat".to_string(), json!("brisket"));

        let started = sessions.start_session(request).await.unwrap();

        assert_eq!(started.extra.get("meat"), Some(&json!("brisket")));
    }

    #[tokio::test]
    async fn update_merges_fields_and_stamps_actor() {
        let (sessions, _) = recorder();
        let started = sessions.start_session(new_session(600, "admin1")).await.unwrap();

        let mut update = SessionUpdate {
            admin_id: Some("admin2".to_string()),
            current_duration: Some(120),
            temperature_data: Some(vec![20.0, 21.5]),
            ..Default::default()
        };
        update.extra.insert("notes".to_string(), json!("wrapped"));
        sessions.update_session(started.id, update).await.unwrap();

        let active = sessions.active_session().await.unwrap().unwrap();
        assert_eq!(active.current_duration, 120);
        assert_eq!(active.temperature_data, vec![20.0, 21.5]);
        assert_eq!(active.target_duration, 600);
        assert_eq!(active.last_updated_by.as_deref(), Some("admin2"));
        assert_eq!(active.extra.get("notes"), Some(&json!("wrapped")));
        assert!(active.last_updated >= started.last_updated);
    }

    #[tokio::test]
    async fn caller_fields_cannot_shadow_session_fields() {
        let (sessions, _) = recorder();
        let request: NewSession = serde_json::from_value(json!({
            "duration": 60,
            "adminId": "a",
            "status": "completed",
            "id": "x",
            "meat": "ribs"
        }))
        .unwrap();

        let started = sessions.start_session(request).await.unwrap();

        let body = serde_json::to_string(&started).unwrap();
        assert_eq!(body.matches("\"status\"").count(), 1);
        assert_eq!(body.matches("\"id\"").count(), 1);
        let seen: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(seen["status"], json!("active"));
        assert_eq!(seen["id"], json!(started.id.to_string()));
        assert_eq!(seen["meat"], json!("ribs"));

        let update: SessionUpdate = serde_json::from_value(json!({
            "lastUpdatedBy": "mallory",
            "startTime": "2000-01-01T00:00:00Z",
            "notes": "spritzed"
        }))
        .unwrap();
        sessions.update_session(started.id, update).await.unwrap();

        let active = sessions.active_session().await.unwrap().unwrap();
        assert!(!active.extra.contains_key("lastUpdatedBy"));
        assert!(!active.extra.contains_key("startTime"));
        assert_eq!(active.extra.get("notes"), Some(&json!("spritzed")));
        let seen = serde_json::to_value(&active).unwrap();
        assert_eq!(seen["status"], json!("active"));
        assert_eq!(seen["startTime"], serde_json::to_value(active.start_time).unwrap());
    }

    #[tokio::test]
    async fn updating_unknown_session_is_an_error() {
        let (sessions, _) = recorder();
        let result = sessions
            .update_session(Uuid::new_v4(), SessionUpdate::default())
            .await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let (sessions, store) = recorder();
        store.fail_writes(true);
        assert!(sessions.start_session(new_session(60, "a")).await.is_err());
        assert!(sessions.end_session(Uuid::new_v4(), "a").await.is_err());

        store.fail_reads(true);
        assert!(sessions.active_session().await.is_err());
        assert!(sessions.session_history().await.is_err());
    }
}
