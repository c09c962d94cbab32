//! SQLite Itemストア
//!
//! Itemの作成・取得機能を提供する。
//! - 書き込み: 専用の単一接続（Arc<Mutex<Connection>>）
//! - 読み取り: deadpool-sqliteによるasync接続プール

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

/// ストアエラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// プール取得エラー
    #[error("プールエラー: {0}")]
    Pool(String),

    /// 接続構築エラー
    #[error("接続構築エラー: {0}")]
    Build(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<deadpool_sqlite::BuildError> for StoreError {
    fn from(err: deadpool_sqlite::BuildError) -> Self {
        StoreError::Build(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for StoreError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for StoreError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Item
///
/// 唯一の永続化エンティティ。サーバー側で採番される`id`以外のフィールドを持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// 一意で単調増加するID（一度使われたIDは再利用されない）
    pub id: i64,
}

/// Item永続化用トレイト
///
/// ハンドラーはこのトレイト越しにストアを利用する。
/// 異なる実装を可能にする（実際のSQLite、テスト用モック）。
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// 新しいItemを採番して保存し、保存したItemを返す
    async fn create(&self) -> Result<Item, StoreError>;

    /// IDでItemを取得
    ///
    /// # Returns
    /// * `Ok(Some(Item))` - 見つかった
    /// * `Ok(None)` - 該当するItemが存在しない
    /// * `Err(StoreError)` - エラー
    async fn get(&self, id: i64) -> Result<Option<Item>, StoreError>;
}

/// SQLite Itemストア
pub struct SqliteItemStore {
    /// 書き込み専用接続（採番の直列化のため単一接続）
    write_conn: Arc<Mutex<Connection>>,
    /// 読み取り用async接続プール
    read_pool: Pool,
}

/// SQLiteデータベースのスキーマを定義するSQL
const SCHEMA_SQL: &str = r#"
-- WALモード設定
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;

-- Itemテーブル
-- AUTOINCREMENTにより削除済みIDも再利用されない
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT
);
"#;

impl SqliteItemStore {
    /// 新しいSqliteItemStoreを作成
    ///
    /// データベースファイルを開き、スキーマを初期化する。
    /// WALモードを有効にし、書き込み用単一接続と読み取り用プールを構成する。
    ///
    /// # Arguments
    /// * `db_path` - データベースファイルのパス
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        let write_conn = Connection::open(db_path)?;
        write_conn.execute_batch(SCHEMA_SQL)?;

        // 読み取り用プールを作成（最大4接続）
        let read_pool = Config::new(db_path)
            .builder(Runtime::Tokio1)
            .map_err(|e| StoreError::Build(e.to_string()))?
            .max_size(4)
            .build()?;

        Ok(Self {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
        })
    }

    /// 保存されているItemの件数を取得
    pub async fn count(&self) -> Result<i64, StoreError> {
        let conn = self.read_pool.get().await?;

        conn.interact(|conn| {
            conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
        .await?
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    /// 書き込み専用接続で採番・保存する
    async fn create(&self) -> Result<Item, StoreError> {
        let conn = self.write_conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                StoreError::Database("書き込み接続のロック取得に失敗（Mutex poisoned）".to_string())
            })?;

            let id: i64 = conn.query_row(
                "INSERT INTO items DEFAULT VALUES RETURNING id",
                [],
                |row| row.get(0),
            )?;

            Ok(Item { id })
        })
        .await
        .map_err(|e| StoreError::Database(format!("タスク実行エラー: {}", e)))?
    }

    /// 読み取りプールから接続を取得し、並行実行可能
    async fn get(&self, id: i64) -> Result<Option<Item>, StoreError> {
        let conn = self.read_pool.get().await?;

        conn.interact(move |conn| {
            conn.query_row("SELECT id FROM items WHERE id = ?1", [id], |row| {
                Ok(Item { id: row.get(0)? })
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await?
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::BTreeMap;

    /// ユニットテスト用のモックItemStore
    #[derive(Debug, Clone, Default)]
    pub struct MockItemStore {
        /// 保存されたItem: id -> Item
        items: Arc<Mutex<BTreeMap<i64, Item>>>,
        /// 次の操作で返すエラー（エラーパスのテスト用）
        next_error: Arc<Mutex<Option<StoreError>>>,
    }

    impl MockItemStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_next_error(&self, error: StoreError) {
            *self.next_error.lock().unwrap() = Some(error);
        }

        pub fn item_count(&self) -> usize {
            self.items.lock().unwrap().len()
        }

        fn take_error(&self) -> Option<StoreError> {
            self.next_error.lock().unwrap().take()
        }
    }

    #[async_trait]
    impl ItemStore for MockItemStore {
        async fn create(&self) -> Result<Item, StoreError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }

            let mut items = self.items.lock().unwrap();
            let id = items.keys().next_back().map_or(1, |last| last + 1);
            let item = Item { id };
            items.insert(id, item);
            Ok(item)
        }

        async fn get(&self, id: i64) -> Result<Option<Item>, StoreError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }

            Ok(self.items.lock().unwrap().get(&id).copied())
        }
    }

    /// モックの採番が1から始まることを確認
    #[tokio::test]
    async fn test_mock_store_assigns_ids_from_one() {
        let store = MockItemStore::new();
        assert_eq!(store.create().await.unwrap(), Item { id: 1 });
        assert_eq!(store.create().await.unwrap(), Item { id: 2 });
        assert_eq!(store.item_count(), 2);
    }

    /// 設定したエラーが次の1回だけ返されることを確認
    #[tokio::test]
    async fn test_mock_store_next_error_is_consumed() {
        let store = MockItemStore::new();
        store.set_next_error(StoreError::Database("テスト".to_string()));

        assert!(store.get(1).await.is_err());
        assert!(store.get(1).await.unwrap().is_none());
    }
}
