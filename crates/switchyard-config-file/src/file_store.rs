//! File-based ConfigStore implementation

use async_trait::async_trait;
use futures::stream;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use switchyard_core::{
    Error, Result,
    config_store::{ConfigChange, ConfigChangeStream, ConfigStore},
};

use crate::atomic::AtomicWriter;
use crate::format::DocumentFormat;

/// File-based configuration store
///
/// Keeps every store key as a top-level entry of a single document on disk
/// and watches the file for changes made by other processes.
#[derive(Debug)]
pub struct FileConfigStore {
    /// Path to the configuration file
    config_path: PathBuf,
    format: DocumentFormat,
    /// Configuration version counter (incremented on each write)
    version: Arc<AtomicU32>,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    /// Create a new file-based configuration store
    ///
    /// A leading `~` is expanded to the home directory. The file does not
    /// have to exist yet; it is created on the first write.
    ///
    /// # Errors
    /// - `Error::Config` if the home directory cannot be determined
    /// - `Error::Config` if an existing file is not a valid document
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_home(config_path.into())?;
        let format = DocumentFormat::from_path(&config_path);

        let store = Self {
            config_path,
            format,
            version: Arc::new(AtomicU32::new(0)),
            write_lock: Mutex::new(()),
        };

        // Surface a broken file now rather than on the first read
        let document = store.read_document()?;
        info!(
            "Initialized FileConfigStore for {:?} ({:?}, {} keys)",
            store.config_path,
            store.format,
            document.len()
        );

        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read and parse the config file; a missing file is an empty document
    fn read_document(&self) -> Result<Map<String, Value>> {
        let contents = match std::fs::read_to_string(&self.config_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file {:?} does not exist yet", self.config_path);
                return Ok(Map::new());
            }
            Err(e) => {
                error!("Failed to read config file: {}", e);
                return Err(Error::Io(e));
            }
        };

        self.format.parse(&contents)
    }

    /// Replace the config file with `document`
    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        let contents = self.format.render(document)?;

        let mut writer = AtomicWriter::new(&self.config_path)?;
        writer.write(contents.as_bytes())?;
        writer.commit().map_err(|e| {
            error!("Failed to write config file: {}", e);
            e
        })?;

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Wrote config file {:?} (version {})", self.config_path, version);
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document()?;
        apply(&mut document);
        self.write_document(&document)
    }
}

fn expand_home(path: PathBuf) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?
            .join(rest)),
        Err(_) => Ok(path),
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut document = self.read_document()?;
        Ok(document.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|document| {
            document.insert(key.to_string(), value);
        })
        .await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        // One document write covers every entry
        self.update(|document| {
            for (key, value) in entries {
                document.insert(key, value);
            }
        })
        .await
    }

    async fn watch_changes(&self) -> Result<ConfigChangeStream<'_>> {
        // Create a channel for file system events
        let (tx, rx) = mpsc::channel(100);

        let config_path = self.config_path.clone();
        let version = self.version.clone();

        // Writes replace the file by rename, so watch its directory
        let watch_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| Error::Config(format!("{:?} is not a file path", config_path)))?;

        tokio::task::spawn_blocking(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            // Create watcher - use std::result::Result to avoid conflict with our Result type
            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Err(e) = notify_tx.send(res) {
                        error!("Failed to send file watch event: {}", e);
                    }
                },
                notify::Config::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
                error!("Failed to watch config directory: {}", e);
                return;
            }

            info!("Watching config file for changes: {:?}", config_path);

            while let Ok(event_result) = notify_rx.recv() {
                match event_result {
                    Ok(event) => {
                        let touches_config = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()));

                        if touches_config
                            && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                        {
                            let change = ConfigChange {
                                key: None,
                                timestamp: chrono::Utc::now(),
                                version: version.load(Ordering::SeqCst),
                            };

                            if tx.blocking_send(Ok(change)).is_err() {
                                debug!("Config change stream closed, stopping watcher");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("File watch error: {}", e);
                        if tx
                            .blocking_send(Err(Error::Store(format!("File watch error: {}", e))))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        // Convert mpsc receiver to stream
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }

    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::config_store::keys;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(dir.path().join("switchyard.yaml"))
            .await
            .unwrap();

        assert_eq!(store.get(keys::POLICY_GROUPS).await.unwrap(), None);
        assert!(!store.path().exists());
        assert_eq!(store.version(), 0);
    }

    #[tokio::test]
    async fn test_invalid_file_rejected() {
        let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(temp_file.path(), "proxy_groups: [unclosed\n").unwrap();

        let result = FileConfigStore::new(temp_file.path()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_read_existing_yaml() {
        let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(
            temp_file.path(),
            r#"
active_proxy_group: work
chat_completion_proxy:
  work:
    gpt:
      - providerId: p1
        modelId: gpt-4
"#,
        )
        .unwrap();

        let store = FileConfigStore::new(temp_file.path()).await.unwrap();
        assert_eq!(
            store.get(keys::ACTIVE_GROUP).await.unwrap(),
            Some(json!("work"))
        );
        let table = store.get(keys::ROUTING_TABLE).await.unwrap().unwrap();
        assert_eq!(table["work"]["gpt"][0]["modelId"], "gpt-4");
    }

    #[tokio::test]
    async fn test_set_keeps_other_keys() {
        let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(temp_file.path(), "unrelated: keep me\n").unwrap();

        let store = FileConfigStore::new(temp_file.path()).await.unwrap();
        store
            .set(keys::PROXY_KEYS, json!([{"name": "ci", "token": "cs-1"}]))
            .await
            .unwrap();

        assert_eq!(store.version(), 1);
        assert_eq!(store.get("unrelated").await.unwrap(), Some(json!("keep me")));
        let keys = store.get(keys::PROXY_KEYS).await.unwrap().unwrap();
        assert_eq!(keys[0]["token"], "cs-1");
    }

    #[tokio::test]
    async fn test_set_many_is_one_write() {
        let dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(dir.path().join("switchyard.json"))
            .await
            .unwrap();

        store
            .set_many(vec![
                (keys::ACTIVE_GROUP.to_string(), json!("office")),
                (keys::POLICY_GROUPS.to_string(), json!([{"name": "office"}])),
            ])
            .await
            .unwrap();

        assert_eq!(store.version(), 1);
        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk["active_proxy_group"], "office");
        assert_eq!(on_disk["proxy_groups"][0]["name"], "office");
    }

    #[tokio::test]
    async fn test_toml_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(dir.path().join("switchyard.toml"))
            .await
            .unwrap();

        store
            .set(
                keys::ROUTING_TABLE,
                json!({"default": {"gpt": [{"providerId": "p1", "modelId": "gpt-4"}]}}),
            )
            .await
            .unwrap();
        store.set(keys::ACTIVE_GROUP, Value::Null).await.unwrap();

        let table = store.get(keys::ROUTING_TABLE).await.unwrap().unwrap();
        assert_eq!(table["default"]["gpt"][0]["providerId"], "p1");
        assert_eq!(store.get(keys::ACTIVE_GROUP).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_writes_do_not_lose_keys() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            FileConfigStore::new(dir.path().join("switchyard.yaml"))
                .await
                .unwrap(),
        );

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&format!("key{}", i), json!(i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..10 {
            assert_eq!(store.get(&format!("key{}", i)).await.unwrap(), Some(json!(i)));
        }
        assert_eq!(store.version(), 10);
    }
}
