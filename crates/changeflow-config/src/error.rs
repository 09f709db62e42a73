use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルを読み込めません: {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("設定ファイルの形式が不正です: {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("環境変数 {name} の値が不正です: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error(transparent)]
    Invalid(#[from] changeflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
