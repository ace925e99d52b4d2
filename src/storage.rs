//! Session persistence
//!
//! The host application owns the actual store; this module only needs a
//! get/set/remove interface over JSON values. [`MemoryStore`] is the in-process
//! implementation used by the CLI and tests.

use crate::error::ComputeError;
use crate::types::{Interaction, Session, UserSettings};
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

const SETTINGS_KEY: &str = "settings";

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Key-value storage of JSON documents
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, ComputeError>;
    fn set(&self, key: &str, value: Value) -> Result<(), ComputeError>;
    fn remove(&self, key: &str) -> Result<(), ComputeError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> ComputeError {
    ComputeError::StorageError("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ComputeError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ComputeError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ComputeError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Typed access to sessions and settings on top of a [`KeyValueStore`]
#[derive(Debug)]
pub struct SessionRepository<S> {
    store: S,
}

impl<S: KeyValueStore> SessionRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ComputeError> {
        match self.store.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ComputeError::StorageError(format!("corrupt entry {}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ComputeError> {
        self.store.set(key, serde_json::to_value(value)?)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), ComputeError> {
        self.write(&session_key(&session.id), session)
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>, ComputeError> {
        self.read(&session_key(session_id))
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), ComputeError> {
        self.store.remove(&session_key(session_id))
    }

    fn require_session(&self, session_id: &str) -> Result<Session, ComputeError> {
        self.load_session(session_id)?
            .ok_or_else(|| ComputeError::SessionNotFound(session_id.to_string()))
    }

    /// Record an interaction on a stored session.
    ///
    /// Returns `false` when the session is already finished and nothing was recorded.
    pub fn append_interaction(
        &self,
        session_id: &str,
        interaction: Interaction,
    ) -> Result<bool, ComputeError> {
        let mut session = self.require_session(session_id)?;
        if !session.record(interaction) {
            debug!("ignoring interaction for finished session {}", session_id);
            return Ok(false);
        }
        self.save_session(&session)?;
        Ok(true)
    }

    /// Mark a stored session finished and return it
    pub fn finish_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<Session, ComputeError> {
        let mut session = self.require_session(session_id)?;
        session.finish(end_time);
        self.save_session(&session)?;
        Ok(session)
    }

    pub fn save_settings(&self, settings: &UserSettings) -> Result<(), ComputeError> {
        self.write(SETTINGS_KEY, settings)
    }

    /// Stored settings, or defaults when none were saved
    pub fn load_settings(&self) -> Result<UserSettings, ComputeError> {
        Ok(self.read(SETTINGS_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InteractionAction, InteractionMetadata};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn repository() -> SessionRepository<MemoryStore> {
        SessionRepository::new(MemoryStore::new())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_session_round_trip_through_store() {
        let repo = repository();
        let session = Session::start("s1", start(), 60);
        repo.save_session(&session).unwrap();

        assert_eq!(repo.load_session("s1").unwrap(), Some(session));
        assert!(repo.store().get("session:s1").unwrap().is_some());
        assert_eq!(repo.load_session("missing").unwrap(), None);
    }

    #[test]
    fn test_append_interaction_updates_totals() {
        let repo = repository();
        repo.save_session(&Session::start("s1", start(), 0)).unwrap();

        let enter = Interaction::new("s1", "v1", InteractionAction::Enter, start());
        let leave_at = start() + Duration::seconds(8);
        let leave = Interaction::new("s1", "v1", InteractionAction::Leave, leave_at)
            .with_metadata(InteractionMetadata::with_dwell_ms(8000.0));
        assert!(repo.append_interaction("s1", enter).unwrap());
        assert!(repo.append_interaction("s1", leave).unwrap());

        let stored = repo.load_session("s1").unwrap().unwrap();
        assert_eq!(stored.interactions.len(), 2);
        assert_eq!(stored.video_count, 1);
        assert_eq!(stored.total_dwell_time, 8000.0);
    }

    #[test]
    fn test_append_to_unknown_session() {
        let repo = repository();
        let result = repo.append_interaction(
            "ghost",
            Interaction::new("ghost", "v1", InteractionAction::Enter, start()),
        );
        assert!(matches!(result, Err(ComputeError::SessionNotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_finished_session_rejects_interactions() {
        let repo = repository();
        repo.save_session(&Session::start("s1", start(), 0)).unwrap();
        let finished = repo
            .finish_session("s1", start() + Duration::minutes(5))
            .unwrap();
        assert!(!finished.is_active);

        let late_at = start() + Duration::minutes(6);
        let late = Interaction::new("s1", "v9", InteractionAction::Enter, late_at);
        assert!(!repo.append_interaction("s1", late).unwrap());
        assert!(repo.load_session("s1").unwrap().unwrap().interactions.is_empty());
    }

    #[test]
    fn test_settings_default_and_persist() {
        let repo = repository();
        assert_eq!(repo.load_settings().unwrap(), UserSettings::default());

        let settings = UserSettings {
            real_time_analysis: false,
            daily_limit_minutes: Some(45),
            ..UserSettings::default()
        };
        repo.save_settings(&settings).unwrap();
        assert_eq!(repo.load_settings().unwrap(), settings);
    }

    #[test]
    fn test_corrupt_entry_is_a_storage_error() {
        let repo = repository();
        repo.store().set("session:bad", json!({"id": 7})).unwrap();
        assert!(matches!(
            repo.load_session("bad"),
            Err(ComputeError::StorageError(_))
        ));

        repo.delete_session("bad").unwrap();
        assert_eq!(repo.load_session("bad").unwrap(), None);
        assert!(repo.store().is_empty());
    }
}
