use crate::errors::LorelaiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "lorelai.yaml";

/// String that never shows up in logs or `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"***\"")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: Secret,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClients {
    pub google: Option<OAuthClient>,
    pub slack: Option<OAuthClient>,
    pub github: Option<OAuthClient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorelaiConfig {
    pub environment: String,
    pub database_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub bind_addr: String,
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    pub api_key: Option<Secret>,
    pub pipeline_url: Option<String>,
    pub oauth: OAuthClients,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LorelaiConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database_path: PathBuf::from(".lorelai/lorelai.db"),
            artifact_dir: PathBuf::from(".lorelai/artifacts"),
            bind_addr: "127.0.0.1:8080".to_string(),
            log_level: None,
            log_format: LogFormat::Text,
            api_key: None,
            pipeline_url: None,
            oauth: OAuthClients::default(),
        }
    }
}

impl LorelaiConfig {
    /// Loads `path` (or `LORELAI_CONFIG`, or `lorelai.yaml` when present) and
    /// applies environment overrides. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("LORELAI_CONFIG").map(PathBuf::from));

        let mut cfg = match explicit {
            Some(p) => Self::from_file(&p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LorelaiError::validation(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let cfg: LorelaiConfig = serde_yaml::from_str(&raw).map_err(|e| {
            LorelaiError::validation(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(cfg)
    }

    /// Environment wins over file values. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LORELAI_ENV") {
            self.environment = v;
        }
        if let Some(v) = lookup("LORELAI_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LORELAI_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LORELAI_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("LORELAI_LOG") {
            self.log_level = Some(v);
        }
        if let Some(v) = lookup("LORELAI_LOG_FORMAT") {
            self.log_format = if v.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
        }
        if let Some(v) = lookup("LORELAI_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = Some(Secret::new(v));
        }
        if let Some(v) = lookup("LORELAI_PIPELINE_URL") {
            self.pipeline_url = Some(v);
        }

        let client = |id: &str, secret: &str| -> Option<OAuthClient> {
            let client_id = lookup(id)?;
            let client_secret = lookup(secret).unwrap_or_default();
            Some(OAuthClient {
                client_id,
                client_secret: Secret::new(client_secret),
            })
        };
        if let Some(c) = client("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET") {
            self.oauth.google = Some(c);
        }
        if let Some(c) = client("SLACK_CLIENT_ID", "SLACK_CLIENT_SECRET") {
            self.oauth.slack = Some(c);
        }
        if let Some(c) = client("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET") {
            self.oauth.github = Some(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_file_values() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lorelai.yaml");
        std::fs::write(
            &path,
            "environment: staging\ndatabase_path: /var/lib/lorelai.db\nlog_format: json\n",
        )?;

        let mut cfg = LorelaiConfig::from_file(&path)?;
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.log_format, LogFormat::Json);

        let env: HashMap<&str, &str> = [
            ("LORELAI_DB", "/tmp/override.db"),
            ("GOOGLE_CLIENT_ID", "gid"),
            ("GOOGLE_CLIENT_SECRET", "gsecret"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(cfg.environment, "staging");
        let google = cfg.oauth.google.clone().unwrap();
        assert_eq!(google.client_secret.expose(), "gsecret");
        assert!(!format!("{:?}", cfg).contains("gsecret"));
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_a_validation_error() {
        let err = LorelaiConfig::from_file(Path::new("/nonexistent/lorelai.yaml")).unwrap_err();
        assert_eq!(
            crate::errors::classify(&err),
            crate::errors::ErrorKind::Validation
        );
    }
}
