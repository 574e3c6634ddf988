use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::entities::expand::Credentials;
use crate::error::RefMedError;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_BASE_ENV: &str = "REFMED_GEMINI_BASE";
const SETTINGS_FILE: &str = "settings.json";

/// Locally persisted user settings: the Gemini key and an optional alternate endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Settings {
    /// Saving blank input clears the field.
    pub fn set_api_key(&mut self, key: &str) {
        self.api_key = non_blank(Some(key));
    }

    pub fn set_base_url(&mut self, url: &str) {
        self.base_url = non_blank(Some(url));
    }

    /// Overlays `GEMINI_API_KEY` / `REFMED_GEMINI_BASE` on top of the stored values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = crate::sources::env_value(GEMINI_API_KEY_ENV) {
            self.api_key = Some(key);
        }
        if let Some(base) = crate::sources::env_value(GEMINI_BASE_ENV) {
            self.base_url = Some(base);
        }
        self
    }

    pub fn ai_available(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::new(self.api_key.as_deref()?, self.base_url.as_deref())
    }

    /// Key with all but the first and last four characters hidden.
    pub fn masked_api_key(&self) -> Option<String> {
        let key = self.api_key.as_deref()?;
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return Some("*".repeat(chars.len()));
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        Some(format!("{head}{}{tail}", "*".repeat(chars.len() - 8)))
    }
}

pub fn refmed_config_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("refmed"),
        None => std::env::temp_dir().join("refmed"),
    }
}

pub fn settings_path() -> PathBuf {
    refmed_config_dir().join(SETTINGS_FILE)
}

/// Reads settings from `path`; a missing file means defaults.
pub async fn load_from(path: &Path) -> Result<Settings, RefMedError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file; using defaults");
            Ok(Settings::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes settings to `path` via a temp file and rename.
pub async fn save_to(path: &Path, settings: &Settings) -> Result<(), RefMedError> {
    let Some(dir) = path.parent() else {
        return Err(RefMedError::InvalidArgument(
            "Invalid settings path (no parent directory)".into(),
        ));
    };
    tokio::fs::create_dir_all(dir).await?;

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(
        ".{SETTINGS_FILE}.{}.{seed}.tmp",
        std::process::id()
    ));

    let body = serde_json::to_vec_pretty(settings)?;
    {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

pub async fn load() -> Result<Settings, RefMedError> {
    load_from(&settings_path()).await
}

pub async fn save(settings: &Settings) -> Result<(), RefMedError> {
    save_to(&settings_path(), settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::gemini::CredentialPlacement;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("refmed-test-{}-{name}", std::process::id()))
            .join(SETTINGS_FILE)
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let path = temp_settings_path("missing");
        let settings = load_from(&path).await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.ai_available());
    }

    #[tokio::test]
    async fn save_then_load_preserves_values() {
        let path = temp_settings_path("save");
        let mut settings = Settings::default();
        settings.set_api_key(" AIzaSyExample ");
        settings.set_base_url("https://proxy.example");
        save_to(&path, &settings).await.unwrap();

        let loaded = load_from(&path).await.unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("AIzaSyExample"));
        assert_eq!(loaded.base_url.as_deref(), Some("https://proxy.example"));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = temp_settings_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = load_from(&path).await.unwrap_err();
        assert!(matches!(err, RefMedError::Json(_)));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[test]
    fn blank_values_clear_fields() {
        let mut settings = Settings {
            api_key: Some("k".into()),
            base_url: Some("https://proxy.example".into()),
        };
        settings.set_api_key("  ");
        settings.set_base_url("");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn credentials_follow_base_url() {
        let official = Settings {
            api_key: Some("k".into()),
            base_url: None,
        };
        let creds = official.credentials().unwrap();
        assert_eq!(creds.transport.placement(), CredentialPlacement::Header);

        let proxied = Settings {
            api_key: Some("k".into()),
            base_url: Some("https://proxy.example".into()),
        };
        let creds = proxied.credentials().unwrap();
        assert_eq!(creds.transport.base(), "https://proxy.example");
        assert_eq!(creds.transport.placement(), CredentialPlacement::HeaderAndQuery);
    }

    #[test]
    fn masked_api_key_hides_middle() {
        let settings = Settings {
            api_key: Some("AIzaSy0123456789".into()),
            base_url: None,
        };
        assert_eq!(settings.masked_api_key().unwrap(), "AIza********6789");

        let short = Settings {
            api_key: Some("abc".into()),
            base_url: None,
        };
        assert_eq!(short.masked_api_key().unwrap(), "***");
    }
}
