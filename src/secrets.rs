//! LLM credential bootstrap.
//!
//! The credential is resolved exactly once at startup. Failing to obtain
//! it is fatal: the server never starts accepting chat traffic without one.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, SecretsSource};
use crate::env::Env;

/// Errors obtaining a secret.
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("credential not found: {0}")]
    Missing(String),

    #[error("failed to read credential file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("secrets source misconfigured: {0}")]
    Misconfigured(String),
}

/// An opaque credential. `Debug` never prints the value.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED; {} chars])", self.0.len())
    }
}

/// Source of the LLM API credential.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Human-readable description of where the secret is read from.
    fn describe(&self) -> String;

    async fn api_key(&self) -> Result<ApiKey, SecretsError>;
}

/// Reads the credential from an environment variable.
pub struct EnvSecrets {
    env: Env,
    var: String,
}

impl EnvSecrets {
    pub fn new(env: Env, var: impl Into<String>) -> Self {
        Self {
            env,
            var: var.into(),
        }
    }
}

#[async_trait]
impl SecretsProvider for EnvSecrets {
    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }

    async fn api_key(&self) -> Result<ApiKey, SecretsError> {
        self.env
            .non_empty(&self.var)
            .map(|v| ApiKey::new(v.trim()))
            .ok_or_else(|| SecretsError::Missing(format!("{} is not set", self.var)))
    }
}

/// Reads the credential from a file, e.g. a mounted container secret.
pub struct FileSecrets {
    path: PathBuf,
}

impl FileSecrets {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SecretsProvider for FileSecrets {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn api_key(&self) -> Result<ApiKey, SecretsError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SecretsError::ReadFile {
                path: self.path.clone(),
                source: e,
            })?;
        let value = content.trim();
        if value.is_empty() {
            return Err(SecretsError::Missing(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(ApiKey::new(value))
    }
}

/// Build the configured secrets provider.
pub fn provider_for(config: &Config, env: &Env) -> Result<Box<dyn SecretsProvider>, SecretsError> {
    match config.secrets.source {
        SecretsSource::Env => {
            let var = config
                .secrets
                .env_var
                .clone()
                .unwrap_or_else(|| config.provider.name.api_key_env_var().to_string());
            Ok(Box::new(EnvSecrets::new(env.clone(), var)))
        }
        SecretsSource::File => {
            let path = config.secrets.path.clone().ok_or_else(|| {
                SecretsError::Misconfigured("[secrets] source = \"file\" requires path".to_string())
            })?;
            Ok(Box::new(FileSecrets::new(path)))
        }
    }
}

/// Resolve the credential once, logging only its length.
pub async fn bootstrap(config: &Config, env: &Env) -> Result<ApiKey, SecretsError> {
    let provider = provider_for(config, env)?;
    match provider.api_key().await {
        Ok(key) => {
            tracing::info!(
                source = %provider.describe(),
                length = key.len(),
                "LLM credential loaded"
            );
            Ok(key)
        }
        Err(e) => {
            tracing::error!(source = %provider.describe(), error = %e, "LLM credential unavailable");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_secret_defaults_to_provider_var() {
        let env = Env::mock([("ANTHROPIC_API_KEY", " sk-ant-test \n")]);
        let key = bootstrap(&Config::default(), &env).await.unwrap();
        assert_eq!(key.expose(), "sk-ant-test");
    }

    #[tokio::test]
    async fn env_secret_honours_custom_var() {
        let env = Env::mock([("MY_KEY", "abc")]);
        let mut config = Config::default();
        config.secrets.env_var = Some("MY_KEY".to_string());
        assert_eq!(bootstrap(&config, &env).await.unwrap().expose(), "abc");
    }

    #[tokio::test]
    async fn missing_env_secret_is_error() {
        let env = Env::mock([("ANTHROPIC_API_KEY", "")]);
        let err = bootstrap(&Config::default(), &env).await.unwrap_err();
        assert!(matches!(err, SecretsError::Missing(_)));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn file_secret_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "sk-file\n").unwrap();

        let mut config = Config::default();
        config.secrets.source = SecretsSource::File;
        config.secrets.path = Some(path);
        let key = bootstrap(&config, &Env::mock(Vec::<(&str, &str)>::new()))
            .await
            .unwrap();
        assert_eq!(key.expose(), "sk-file");
    }

    #[test]
    fn file_source_without_path_is_misconfigured() {
        let mut config = Config::default();
        config.secrets.source = SecretsSource::File;
        let result = provider_for(&config, &Env::mock(Vec::<(&str, &str)>::new()));
        assert!(matches!(result, Err(SecretsError::Misconfigured(_))));
    }

    #[tokio::test]
    async fn empty_file_secret_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "   \n").unwrap();
        let err = FileSecrets::new(path).api_key().await.unwrap_err();
        assert!(matches!(err, SecretsError::Missing(_)));
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("14 chars"));
    }
}
