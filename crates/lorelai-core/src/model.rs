use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::LorelaiError;

// --- Tenancy ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub org_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

/// Third-party systems an organisation can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Slack,
    GoogleDrive,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Slack, Provider::GoogleDrive, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Slack => "slack",
            Provider::GoogleDrive => "google_drive",
            Provider::Github => "github",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Slack => "Slack",
            Provider::GoogleDrive => "Google Drive",
            Provider::Github => "GitHub",
        }
    }

    /// Accepts the stored form plus the short URL slugs used by the web routes.
    pub fn parse(s: &str) -> Result<Self, LorelaiError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slack" => Ok(Provider::Slack),
            "google_drive" | "google-drive" | "google" | "gdrive" => Ok(Provider::GoogleDrive),
            "github" => Ok(Provider::Github),
            other => Err(LorelaiError::validation(format!(
                "unknown provider '{}' (expected slack|google_drive|github)",
                other
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth grant held for one user of one organisation at one provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<String>,
    pub updated_at: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("org_id", &self.org_id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<i64>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// --- Benchmarks ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTemplate {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Int,
    Float,
    Bool,
    Json,
}

impl ParameterType {
    pub fn parse(s: &str) -> Result<Self, LorelaiError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            other => Err(LorelaiError::validation(format!(
                "unsupported parameter type '{}' (expected string|int|float|bool|json)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }

    /// Checks that `raw` is a legal value of this type.
    pub fn check_value(&self, raw: &str) -> Result<(), LorelaiError> {
        let ok = match self {
            Self::String => true,
            Self::Int => raw.trim().parse::<i64>().is_ok(),
            Self::Float => raw.trim().parse::<f64>().map(|v| v.is_finite()).unwrap_or(false),
            Self::Bool => matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "false" | "1" | "0" | "yes" | "no"
            ),
            Self::Json => serde_json::from_str::<serde_json::Value>(raw).is_ok(),
        };
        if ok {
            Ok(())
        } else {
            Err(LorelaiError::validation(format!(
                "value '{}' is not a valid {}",
                raw,
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub template_id: i64,
    pub name: String,
    pub param_type: ParameterType,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LorelaiError> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(LorelaiError::validation(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub id: i64,
    pub template_id: i64,
    pub template_name: String,
    pub template_version: i64,
    pub status: RunStatus,
    pub fingerprint: String,
    pub parameters: serde_json::Value,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub run_id: i64,
    pub key: String,
    pub value: String,
    pub recorded_at: String,
}

/// One dataset question with its reference answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetCase {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub expected_sources: Vec<String>,
}

/// What the question-answering pipeline returned for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineAnswer {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub latency_ms: u64,
}

// --- Indexing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    InProgress,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl IndexingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LorelaiError> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            other => Err(LorelaiError::validation(format!(
                "unknown indexing status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LorelaiError> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(LorelaiError::validation(format!(
                "unknown item status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingRun {
    pub id: i64,
    pub org_id: i64,
    pub source: Provider,
    pub status: IndexingStatus,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedItem {
    pub id: i64,
    pub run_id: i64,
    pub parent_item_id: Option<i64>,
    pub item_type: String,
    pub external_id: String,
    pub name: String,
    pub status: ItemStatus,
    pub error: Option<String>,
}

/// Diagnostic payload shown in the item detail modal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item_extractedtext: Option<String>,
    pub item_log: Option<String>,
    pub item_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub parent_item_id: Option<i64>,
    pub item_type: String,
    pub external_id: String,
    pub name: String,
    pub status: Option<ItemStatus>,
    pub error: Option<String>,
    pub extracted_text: Option<String>,
    pub log: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_type_checks_values() {
        assert!(ParameterType::Int.check_value("42").is_ok());
        assert!(ParameterType::Int.check_value("4.2").is_err());
        assert!(ParameterType::Float.check_value("1.0").is_ok());
        assert!(ParameterType::Float.check_value("NaN").is_err());
        assert!(ParameterType::Bool.check_value("yes").is_ok());
        assert!(ParameterType::Bool.check_value("maybe").is_err());
        assert!(ParameterType::Json.check_value(r#"{"k": [1, 2]}"#).is_ok());
        assert!(ParameterType::Json.check_value("{oops").is_err());
        assert!(ParameterType::String.check_value("").is_ok());
    }

    #[test]
    fn unknown_parameter_type_is_rejected() {
        let err = ParameterType::parse("decimal").unwrap_err();
        assert!(matches!(err, LorelaiError::Validation(_)));
    }

    #[test]
    fn provider_accepts_route_slugs() {
        assert_eq!(Provider::parse("google").unwrap(), Provider::GoogleDrive);
        assert_eq!(Provider::parse("Slack").unwrap(), Provider::Slack);
        assert!(Provider::parse("dropbox").is_err());
    }

    #[test]
    fn credential_debug_hides_tokens() {
        let c = Credential {
            id: 1,
            org_id: 1,
            user_id: 1,
            provider: Provider::Slack,
            access_token: "xoxp-secret".into(),
            refresh_token: Some("refresh-secret".into()),
            token_type: None,
            scope: None,
            expires_at: None,
            updated_at: "now".into(),
        };
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("secret"));
    }
}
