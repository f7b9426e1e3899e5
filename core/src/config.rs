//! Client configuration.
//!
//! A `ClientConfig` names one org/project scope on one API host. It is
//! supplied once when the client is built and never mutated afterwards.

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_VERSION: &str = "v1";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub api_host: String,
    pub client_id: String,
    pub client_secret: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_host", &self.api_host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("project_id", &self.project_id)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        api_host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        org_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            api_host: api_host.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            org_id: org_id.into(),
            project_id: project_id.into(),
            api_version: default_api_version(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Read `TASKS_API_HOST`, `TASKS_CLIENT_ID`, `TASKS_CLIENT_SECRET`,
    /// `TASKS_ORG_ID`, `TASKS_PROJECT_ID` and optionally `TASKS_API_VERSION`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Configuration(format!("{key} is not set")))
        };
        let config = Self {
            api_host: required("TASKS_API_HOST")?,
            client_id: required("TASKS_CLIENT_ID")?,
            client_secret: required("TASKS_CLIENT_SECRET")?,
            org_id: required("TASKS_ORG_ID")?,
            project_id: required("TASKS_PROJECT_ID")?,
            api_version: lookup("TASKS_API_VERSION").unwrap_or_else(default_api_version),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_host)
            .map_err(|e| Error::Configuration(format!("invalid api host {:?}: {e}", self.api_host)))?;
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("org_id", &self.org_id),
            ("project_id", &self.project_id),
            ("api_version", &self.api_version),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// `{api_host}/api/{api_version}/org/{org_id}/project/{project_id}`
    pub fn base_url(&self) -> String {
        format!(
            "{}/api/{}/org/{}/project/{}",
            self.api_host.trim_end_matches('/'),
            self.api_version,
            self.org_id,
            self.project_id
        )
    }
}

/// The OAuth token endpoint served by `oauth_host`.
pub fn token_endpoint(oauth_host: &str) -> String {
    format!("{}/oauth2/token", oauth_host.trim_end_matches('/'))
}

/// Read `TASKS_OAUTH_HOST`.
pub fn oauth_host_from_env() -> Result<String> {
    oauth_host_from_lookup(|key| std::env::var(key).ok())
}

fn oauth_host_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let host = lookup("TASKS_OAUTH_HOST")
        .ok_or_else(|| Error::Configuration("TASKS_OAUTH_HOST is not set".to_string()))?;
    Url::parse(&host)
        .map_err(|e| Error::Configuration(format!("invalid oauth host {host:?}: {e}")))?;
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> ClientConfig {
        ClientConfig::new("https://api.example.com/", "id", "secret", "org-1", "proj-1")
    }

    #[test]
    fn base_url_shape() {
        assert_eq!(
            config().base_url(),
            "https://api.example.com/api/v1/org/org-1/project/proj-1"
        );
        assert_eq!(
            config().with_api_version("v2").base_url(),
            "https://api.example.com/api/v2/org/org-1/project/proj-1"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn validate_rejects_bad_host_and_empty_ids() {
        assert!(config().validate().is_ok());
        let mut bad = config();
        bad.api_host = "not a url".to_string();
        assert!(matches!(bad.validate(), Err(Error::Configuration(_))));
        let mut bad = config();
        bad.org_id = " ".to_string();
        assert!(matches!(bad.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn lookup_reads_all_fields() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TASKS_API_HOST", "http://localhost:3000"),
            ("TASKS_CLIENT_ID", "id"),
            ("TASKS_CLIENT_SECRET", "secret"),
            ("TASKS_ORG_ID", "org"),
            ("TASKS_PROJECT_ID", "proj"),
        ]);
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.project_id, "proj");
    }

    #[test]
    fn lookup_reports_missing_variable() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: TASKS_API_HOST is not set");
    }

    #[test]
    fn deserializes_with_default_version() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_host":"http://h","client_id":"a","client_secret":"b","org_id":"o","project_id":"p"}"#,
        )
        .unwrap();
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn oauth_host_lookup() {
        let host = oauth_host_from_lookup(|k| {
            (k == "TASKS_OAUTH_HOST").then(|| "https://oauth.example.com".to_string())
        })
        .unwrap();
        assert_eq!(token_endpoint(&host), "https://oauth.example.com/oauth2/token");

        let err = oauth_host_from_lookup(|_| None).unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: TASKS_OAUTH_HOST is not set");

        let err = oauth_host_from_lookup(|_| Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn token_endpoint_trims_slash() {
        assert_eq!(token_endpoint("https://oauth.example.com/"), "https://oauth.example.com/oauth2/token");
    }
}
