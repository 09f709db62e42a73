pub mod error;

pub use error::*;

use changeflow_cloud::{DEFAULT_BATCH_SIZE, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILENAMES: [&str; 2] = ["changeflow.yaml", ".changeflow.yaml"];
const DEFAULT_REGION: &str = "us-east-1";

/// プロバイダー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// リージョン（未指定時は us-east-1）
    pub region: Option<String>,
    /// API エンドポイントの上書き（ローカル検証用）
    pub endpoint_url: Option<String>,
    /// 1 回の更新リクエストに含める最大変更数
    pub batch_size: usize,
    /// change token リトライ設定
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// 実際に使用するリージョン
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// YAML ファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// 環境変数で上書き
    ///
    /// - `AWS_REGION`（なければ `AWS_DEFAULT_REGION`）
    /// - `CHANGEFLOW_ENDPOINT_URL`
    /// - `CHANGEFLOW_MAX_ATTEMPTS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(region) =
            std::env::var("AWS_REGION").or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        {
            if !region.is_empty() {
                self.region = Some(region);
            }
        }

        if let Ok(endpoint) = std::env::var("CHANGEFLOW_ENDPOINT_URL") {
            if !endpoint.is_empty() {
                self.endpoint_url = Some(endpoint);
            }
        }

        if let Ok(value) = std::env::var("CHANGEFLOW_MAX_ATTEMPTS") {
            self.retry.max_attempts = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "CHANGEFLOW_MAX_ATTEMPTS",
                value,
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(changeflow_cloud::CloudError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            )
            .into());
        }
        // リージョン名がグローバルスコープと衝突しないこと
        if changeflow_cloud::Scope::new(self.region()).is_global() {
            return Err(changeflow_cloud::CloudError::InvalidConfig(format!(
                "region must not be `{}`",
                self.region()
            ))
            .into());
        }
        self.retry.validate()?;
        Ok(())
    }
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 CHANGEFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: changeflow.yaml, .changeflow.yaml
/// 3. ~/.config/changeflow/changeflow.yaml (グローバル設定)
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var("CHANGEFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("CHANGEFLOW_CONFIG_PATH does not exist: {}", path.display());
    }

    if let Some(path) = std::env::current_dir()
        .ok()
        .and_then(|dir| find_config_file_in(&dir))
    {
        return Some(path);
    }

    dirs::config_dir()
        .map(|dir| dir.join("changeflow").join(CONFIG_FILENAMES[0]))
        .filter(|path| path.exists())
}

/// 指定ディレクトリ内の設定ファイルを探す
pub fn find_config_file_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// 設定を読み込む（ファイルがなければデフォルト値）
pub fn load_config() -> Result<ProviderConfig> {
    let mut config = match find_config_file() {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            ProviderConfig::from_file(&path)?
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            ProviderConfig::default()
        }
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
