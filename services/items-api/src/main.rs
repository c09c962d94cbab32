//! Itemの作成・取得を提供するHTTP APIサーバー
//!
//! 本バイナリは以下の機能を提供する:
//! - Itemの作成 (POST /create/, POST /generic/create/)
//! - Itemの取得 (GET /{id}/, GET /generic/{id}/)
//! - ヘルスチェック (GET /health)
//!
//! `/generic` 配下のルートは同じハンドラーを共有しており、
//! 入力に対して常に同じステータスコードとボディを返す。

mod config;
mod error;
mod logging;
mod serializer;
mod store;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use serializer::{ItemRepresentation, ItemSerializer, ValidationErrors};
pub use store::{Item, ItemStore, SqliteItemStore, StoreError};

use serializer::parse_body;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// 汎用ルートのプレフィックス
const GENERIC_PREFIX: &str = "/generic";

/// 500レスポンスのメッセージ（ストアの詳細はログにのみ出力する）
const INTERNAL_ERROR_MESSAGE: &str = "内部エラーが発生しました";

/// アプリケーション状態
///
/// ルーター全体で共有される状態を保持する。
/// ストアはプロセス起動時に一度だけ構築され、ここから各ハンドラーに渡される。
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
}

/// 起動処理のエラー
#[derive(Debug, Error)]
enum StartupError {
    #[error("設定の読み込みに失敗しました: {0}")]
    Config(#[from] ConfigError),

    #[error("SQLiteストアの初期化に失敗しました: {0}")]
    Store(#[from] StoreError),

    #[error("サーバーI/Oエラー: {0}")]
    Io(#[from] std::io::Error),
}

/// ヘルスチェックエンドポイント
async fn health() -> &'static str {
    "OK"
}

/// URLのIDセグメントを解釈する
///
/// 数字のみからなるセグメントだけを受け付ける。符号付きやi64に収まらない値はNone。
fn parse_item_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Item作成エンドポイント (POST /create/)
///
/// リクエストボディを`Content-Type`に従って解釈し、シリアライザーで検証してから
/// 新しいItemを保存する。
///
/// # Returns
/// - 201 Created: 作成されたItem（採番されたidを含む）
/// - 400 Bad Request: ボディの解釈失敗（`{"detail": ...}`）またはバリデーションエラー（エラーマップ）
/// - 415 Unsupported Media Type: 未対応の`Content-Type`
/// - 500 Internal Server Error: データベースエラー
async fn create_item(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    tracing::info!(body_len = body.len(), content_type = ?content_type, "Item作成リクエストを受信");

    let data = match parse_body(content_type, &body) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!(error = %e, "リクエストボディを解釈できない");
            return e.into_response();
        }
    };

    if let Err(errors) = ItemSerializer::from_representation(&data) {
        tracing::debug!(errors = ?errors, "リクエストボディのバリデーションに失敗");
        return errors.into_response();
    }

    match state.store.create().await {
        Ok(item) => {
            tracing::info!(item_id = item.id, "Itemを新規作成");
            (
                StatusCode::CREATED,
                Json(ItemSerializer::to_representation(&item)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Item作成エラー");
            ApiError::internal_error(INTERNAL_ERROR_MESSAGE).into_response()
        }
    }
}

/// Item取得エンドポイント (GET /{id}/)
///
/// # Returns
/// - 200 OK: Item
/// - 404 Not Found: 該当するItemが存在しない（IDが整数でない場合も含む）
/// - 500 Internal Server Error: データベースエラー
async fn retrieve_item(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Some(item_id) = parse_item_id(&raw_id) else {
        tracing::debug!(raw_id = %raw_id, "整数でないItem ID");
        return ApiError::not_found(format!("Itemが見つかりません: {}", raw_id)).into_response();
    };

    match state.store.get(item_id).await {
        Ok(Some(item)) => {
            tracing::debug!(item_id, "Itemを返却");
            Json(ItemSerializer::to_representation(&item)).into_response()
        }
        Ok(None) => {
            tracing::debug!(item_id, "Itemが見つからない");
            ApiError::not_found(format!("Itemが見つかりません: {}", item_id)).into_response()
        }
        Err(e) => {
            tracing::error!(item_id, error = %e, "Item取得エラー");
            ApiError::internal_error(INTERNAL_ERROR_MESSAGE).into_response()
        }
    }
}

/// Item操作のルート
///
/// 通常ルートと`/generic`配下の両方にこのルーター定義を登録する。
fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/create/", post(create_item))
        .route("/{id}/", get(retrieve_item))
}

/// ルーターを構築する
///
/// TraceLayerによりリクエスト/レスポンスの構造化ログを自動記録する。
///
/// # Arguments
/// * `store` - Itemストア
pub fn create_router(store: Arc<dyn ItemStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/health", get(health))
        .merge(item_routes())
        .nest(GENERIC_PREFIX, item_routes())
        // リクエストトレーシングレイヤー（method, path, status, latencyを自動記録）
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// シャットダウンシグナルを待機する
///
/// SIGTERMまたはCtrl+C (SIGINT) を待機し、いずれかを受信したらリターンする。
/// シグナルハンドラーの登録に失敗した場合は、そのシグナルを待たない。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C シグナルハンドラーの登録に失敗しました");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM シグナルハンドラーの登録に失敗しました");
                std::future::pending::<()>().await;
            }
        }
    };

    // Windows等の非Unix環境ではSIGTERMは利用不可
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C (SIGINT) を受信しました。graceful shutdownを開始します");
        }
        _ = terminate => {
            tracing::info!("SIGTERM を受信しました。graceful shutdownを開始します");
        }
    }
}

/// 設定の読み込みからサーバー停止までを実行する
async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    tracing::info!(db_path = %config.db_path(), "データベースパス");

    let store = SqliteItemStore::new(config.db_path()).await?;
    let item_count = store.count().await?;
    tracing::info!(item_count, "SQLiteストアを初期化しました");

    let app = create_router(Arc::new(store));

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    tracing::info!("リッスン開始: {}", config.listen_addr());

    // シグナル受信後は新規コネクションの受付を停止し、処理中のリクエストの完了を待つ。
    // サーバー終了時にルーターと共にストアがドロップされ、SQLite接続がクローズされる。
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// メイン関数
///
/// # 環境変数
/// - `DB_PATH`: データベースファイルのパス（デフォルト: /var/lib/items/items.db）
/// - `LISTEN_ADDR`: リッスンアドレス（デフォルト: 127.0.0.1:8080）
/// - `RUST_LOG`: ログレベル（デフォルト: info）
#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    tracing::info!("Items API サーバーを起動します");

    match run().await {
        Ok(()) => {
            tracing::info!("サーバーが正常に停止しました");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "サーバーが異常終了しました");
            ExitCode::FAILURE
        }
    }
}
