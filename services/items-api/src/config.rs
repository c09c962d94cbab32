//! サーバー設定
//!
//! 環境変数からデータベースパスとリッスンアドレスを読み込む。

use std::net::SocketAddr;

use thiserror::Error;

/// データベースパス環境変数名
pub const DB_PATH_ENV: &str = "DB_PATH";

/// リッスンアドレス環境変数名
pub const LISTEN_ADDR_ENV: &str = "LISTEN_ADDR";

/// デフォルトのデータベースパス
pub const DEFAULT_DB_PATH: &str = "/var/lib/items/items.db";

/// デフォルトのリッスンアドレス（リバースプロキシ配下での利用を想定）
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 環境変数の値が不正
    #[error("環境変数 {name} の値が不正です: {value}")]
    InvalidValue { name: String, value: String },
}

/// サーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    db_path: String,
    listen_addr: SocketAddr,
}

impl Config {
    /// 明示的な値で設定を作成
    pub fn new(db_path: impl Into<String>, listen_addr: SocketAddr) -> Self {
        Self {
            db_path: db_path.into(),
            listen_addr,
        }
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `DB_PATH`: データベースファイルのパス（デフォルト: /var/lib/items/items.db）
    /// - `LISTEN_ADDR`: リッスンアドレス（デフォルト: 127.0.0.1:8080）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の取得関数から設定を読み込み（環境変数に依存しないテスト用）
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup(DB_PATH_ENV).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let listen_addr = lookup(LISTEN_ADDR_ENV).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: LISTEN_ADDR_ENV.to_string(),
                value: listen_addr.clone(),
            })?;

        Ok(Self::new(db_path, listen_addr))
    }

    /// データベースファイルのパスを取得
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// リッスンアドレスを取得
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}
