use async_trait::async_trait;
use log::{ error, info };
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use std::collections::HashMap;
use std::fmt;
use std::path::{ Path, PathBuf };
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const ANON_KEY: &str = "anonUserId";
const TONE_KEY: &str = "tone";

/// Defaults written the first time an anonymous user is created.
const DEFAULT_SETTINGS: [(&str, &str); 3] = [
    ("fontSize", "18"),
    ("theme", "light"),
    ("tone", "light"),
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tone '{0}', expected light or heavy")]
    InvalidTone(String),
}

/// Register of the assistant's Turkish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Modern, everyday Turkish.
    #[default]
    Light,
    /// Classical, literary Turkish.
    Heavy,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Light => "light",
            Tone::Heavy => "heavy",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tone {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Tone::Light),
            "heavy" => Ok(Tone::Heavy),
            _ => Err(SettingsError::InvalidTone(s.to_string())),
        }
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_tone(&self) -> Result<Tone, SettingsError>;

    /// Returns `true` when the stored value changed.
    async fn update_tone(&self, tone: Tone) -> Result<bool, SettingsError>;

    async fn get_or_create_user_id(&self) -> Result<String, SettingsError>;
}

fn tone_from(value: Option<&str>) -> Tone {
    // Unknown values degrade to the default register.
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}

/// Key/value settings persisted as a flat JSON object of strings. Keys this
/// crate does not own are preserved on write.
pub struct FileSettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, JsonValue>, SettingsError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Map::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &Map<String, JsonValue>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get_tone(&self) -> Result<Tone, SettingsError> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;
        Ok(tone_from(map.get(TONE_KEY).and_then(JsonValue::as_str)))
    }

    async fn update_tone(&self, tone: Tone) -> Result<bool, SettingsError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.get(TONE_KEY).and_then(JsonValue::as_str) == Some(tone.as_str()) {
            return Ok(false);
        }
        map.insert(TONE_KEY.to_string(), JsonValue::String(tone.as_str().to_string()));
        self.write_map(&map).await?;
        Ok(true)
    }

    async fn get_or_create_user_id(&self) -> Result<String, SettingsError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if let Some(id) = map.get(ANON_KEY).and_then(JsonValue::as_str) {
            return Ok(id.to_string());
        }

        let id = Uuid::new_v4().to_string();
        for (key, value) in DEFAULT_SETTINGS {
            map.insert(key.to_string(), JsonValue::String(value.to_string()));
        }
        map.insert(ANON_KEY.to_string(), JsonValue::String(id.clone()));
        if let Err(e) = self.write_map(&map).await {
            error!("Error creating anon user: {}", e);
            return Err(e);
        }
        info!("New anonymous user id saved: {}", id);
        Ok(id)
    }
}

/// Settings kept only for the lifetime of the process.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tone(tone: Tone) -> Self {
        let mut values = HashMap::new();
        values.insert(TONE_KEY.to_string(), tone.as_str().to_string());
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_tone(&self) -> Result<Tone, SettingsError> {
        let values = self.values.lock().await;
        Ok(tone_from(values.get(TONE_KEY).map(String::as_str)))
    }

    async fn update_tone(&self, tone: Tone) -> Result<bool, SettingsError> {
        let mut values = self.values.lock().await;
        let previous = values.insert(TONE_KEY.to_string(), tone.as_str().to_string());
        Ok(previous.as_deref() != Some(tone.as_str()))
    }

    async fn get_or_create_user_id(&self) -> Result<String, SettingsError> {
        let mut values = self.values.lock().await;
        if let Some(id) = values.get(ANON_KEY) {
            return Ok(id.clone());
        }
        let id = Uuid::new_v4().to_string();
        for (key, value) in DEFAULT_SETTINGS {
            values.entry(key.to_string()).or_insert_with(|| value.to_string());
        }
        values.insert(ANON_KEY.to_string(), id.clone());
        Ok(id)
    }
}
