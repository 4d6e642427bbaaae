use crate::infrastructure::config::write_json_pretty;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const EVENTS_KEY: &str = "events";
pub const INSTANCE_STATES_KEY: &str = "repeatInstanceStates";
pub const MEMOS_KEY: &str = "memos";
pub const SETTINGS_KEY: &str = "settings";
pub const GOOGLE_SYNC_KEY: &str = "googleSync";

/// Whole-value key/value persistence. Every `set` replaces the stored value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, InfraError>;
    fn set(&self, key: &str, value: Value) -> Result<(), InfraError>;
}

pub fn load_value<T, S>(store: &S, key: &str) -> Result<Option<T>, InfraError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    store
        .get(key)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(InfraError::from)
}

pub fn save_value<T, S>(store: &S, key: &str, value: &T) -> Result<(), InfraError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    store.set(key, serde_json::to_value(value)?)
}

/// A single JSON document on disk holding every key, rewritten on each write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(InfraError::InvalidConfig(format!(
                            "expected a JSON object in {}",
                            path.display()
                        )));
                    }
                }
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Map<String, Value>>, InfraError> {
        self.document
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("store lock poisoned: {error}")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), InfraError> {
        let mut document = self.lock()?;
        document.insert(key.to_string(), value);
        write_json_pretty(&self.path, &*document)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("store lock poisoned: {error}")))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), InfraError> {
        let mut values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("store lock poisoned: {error}")))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RepeatInstanceState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_FILE: AtomicUsize = AtomicUsize::new(0);

    struct TempFile {
        path: PathBuf,
    }

    impl TempFile {
        fn new() -> Self {
            let sequence = NEXT_TEMP_FILE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "memocal-store-tests-{}-{}.json",
                std::process::id(),
                sequence
            ));
            Self { path }
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn sample_states() -> Vec<RepeatInstanceState> {
        vec![RepeatInstanceState {
            event_id: "a".to_string(),
            instance_date: "2024-01-15".to_string(),
            completed: true,
        }]
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let file = TempFile::new();
        {
            let store = JsonFileStore::open(&file.path).expect("open store");
            save_value(&store, INSTANCE_STATES_KEY, &sample_states()).expect("save states");
        }

        let reopened = JsonFileStore::open(&file.path).expect("reopen store");
        let loaded: Vec<RepeatInstanceState> = load_value(&reopened, INSTANCE_STATES_KEY)
            .expect("load states")
            .expect("states present");
        assert_eq!(loaded, sample_states());

        let raw = fs::read_to_string(&file.path).expect("read store");
        assert!(raw.contains("\n  \"repeatInstanceStates\": ["));
        assert!(raw.contains("\"instanceDate\": \"2024-01-15\""));
    }

    #[test]
    fn missing_key_loads_as_none() {
        let store = InMemoryStore::default();
        let loaded: Option<Vec<RepeatInstanceState>> =
            load_value(&store, EVENTS_KEY).expect("load missing key");
        assert!(loaded.is_none());
    }

    #[test]
    fn file_store_rejects_non_object_document() {
        let file = TempFile::new();
        fs::write(&file.path, "[1, 2, 3]").expect("write file");
        assert!(matches!(
            JsonFileStore::open(&file.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
