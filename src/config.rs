use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_limit: default_page_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://registry.modelcontextprotocol.io".to_string()
}
fn default_page_limit() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Texts per embedding API call. The provider's hard ceiling is higher;
    /// 500 leaves a conservative margin.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Secrets read from the environment once at process start.
///
/// The config file holds tunables; credentials never land on disk.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub cron_secret: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
            cron_secret: env_nonempty("CRON_SECRET"),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.registry.page_limit == 0 {
        anyhow::bail!("registry.page_limit must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or disabled.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("regsearch.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "/tmp/regsearch.sqlite"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.registry.base_url,
            "https://registry.modelcontextprotocol.io"
        );
        assert_eq!(config.registry.page_limit, 100);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.batch_size, 500);
        assert_eq!(config.embedding.timeout_secs, 30);
    }

    #[test]
    fn test_rejects_zero_page_limit() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "/tmp/regsearch.sqlite"

[registry]
page_limit = 0

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "/tmp/regsearch.sqlite"

[embedding]
provider = "cohere"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
