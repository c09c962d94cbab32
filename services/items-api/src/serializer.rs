//! Itemシリアライザー
//!
//! 保存済みレコード（`Item`）とHTTPで送受信する表現の相互変換を行う。
//! - 出力: 保存されている全フィールドをそのまま公開する（現状は`id`のみ）
//! - 入力: `Content-Type`に応じてリクエストボディを解釈し、形式を検証する。
//!   `id`は読み取り専用のため入力値は無視する

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::Item;

/// 形式エラー（オブジェクト以外）を格納するキー
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const JSON_MEDIA_TYPE: &str = "application/json";
const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_MEDIA_TYPE: &str = "multipart/form-data";

/// ItemのHTTP表現
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRepresentation {
    pub id: i64,
}

/// 検証済みの入力
///
/// Itemにはクライアントが指定できるフィールドが存在しないため空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInput;

/// `Content-Type`に従って解釈したリクエストボディ
#[derive(Debug, Clone, PartialEq)]
pub enum RequestData {
    /// ボディなし、または`Content-Type`なし
    Empty,
    /// JSONボディ（オブジェクトとは限らない）
    Json(Value),
    /// フォーム（urlencoded / multipart）。フィールドは常にキーと値の組になる
    Form,
}

/// リクエストボディの解釈エラー
///
/// メッセージはそのままレスポンスの`detail`になる。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// ボディが宣言された形式として解釈できない
    #[error("{0}")]
    Malformed(String),

    /// 対応していない`Content-Type`
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),
}

impl ParseError {
    /// 対応するHTTPステータスコード
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::Malformed(_) => StatusCode::BAD_REQUEST,
            ParseError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

/// バリデーションエラー
///
/// フィールド名からエラーメッセージ一覧へのマップ。
/// JSON上は `{"<field>": ["<message>", ...]}` の形になり、400レスポンスのボディとしてそのまま返す。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定フィールドにエラーメッセージを追加
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// 指定フィールドのエラーメッセージを取得
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `Content-Type`ヘッダーの値からメディアタイプ（小文字）とパラメータを取り出す
fn split_media_type(content_type: &str) -> (String, Vec<(String, String)>) {
    let mut parts = content_type.split(';');
    let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params = parts
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            Some((
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect();
    (essence, params)
}

/// リクエストボディを`Content-Type`に従って解釈する
///
/// - ボディが空、または`Content-Type`がない場合は`Empty`（検証対象なし）
/// - `application/json`: JSONとしてパースする
/// - `application/x-www-form-urlencoded`: フィールドはすべて無視されるため常に`Form`
/// - `multipart/form-data`: boundaryパラメータが必須
/// - それ以外: `UnsupportedMediaType`
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<RequestData, ParseError> {
    let Some(content_type) = content_type else {
        return Ok(RequestData::Empty);
    };
    if body.is_empty() {
        return Ok(RequestData::Empty);
    }

    let (essence, params) = split_media_type(content_type);
    match essence.as_str() {
        JSON_MEDIA_TYPE => serde_json::from_slice(body)
            .map(RequestData::Json)
            .map_err(|e| ParseError::Malformed(format!("JSON parse error - {}", e))),
        FORM_MEDIA_TYPE => Ok(RequestData::Form),
        MULTIPART_MEDIA_TYPE => {
            let has_boundary = params
                .iter()
                .any(|(key, value)| key == "boundary" && !value.is_empty());
            if has_boundary {
                Ok(RequestData::Form)
            } else {
                Err(ParseError::Malformed(
                    "Multipart form parse error - Invalid boundary in multipart: None".to_string(),
                ))
            }
        }
        _ => Err(ParseError::UnsupportedMediaType(content_type.to_string())),
    }
}

/// Itemシリアライザー
pub struct ItemSerializer;

impl ItemSerializer {
    /// 保存済みItemをHTTP表現に変換
    pub fn to_representation(item: &Item) -> ItemRepresentation {
        ItemRepresentation { id: item.id }
    }

    /// 解釈済みのリクエストデータを検証
    ///
    /// # Returns
    /// * `Ok(ItemInput)` - 空、フォーム、またはJSONオブジェクト（キーはすべて無視）
    /// * `Err(ValidationErrors)` - オブジェクト以外のJSON
    pub fn from_representation(data: &RequestData) -> Result<ItemInput, ValidationErrors> {
        match data {
            RequestData::Empty | RequestData::Form | RequestData::Json(Value::Object(_)) => {
                Ok(ItemInput)
            }
            RequestData::Json(other) => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    NON_FIELD_ERRORS,
                    format!(
                        "Invalid data. Expected a dictionary, but got {}.",
                        type_name(other)
                    ),
                );
                Err(errors)
            }
        }
    }
}

/// エラーメッセージ用のJSON値の型名
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Option<&str> = Some("application/json");

    /// to_representationがidをそのまま出力することを確認
    #[test]
    fn test_to_representation_exposes_id() {
        let repr = ItemSerializer::to_representation(&Item { id: 42 });
        assert_eq!(repr, ItemRepresentation { id: 42 });
        assert_eq!(serde_json::to_string(&repr).unwrap(), r#"{"id":42}"#);
    }

    // ========================================
    // parse_bodyのテスト
    // ========================================

    /// 空ボディはContent-Typeに関係なく検証対象なしになることを確認
    #[test]
    fn test_empty_body_is_empty_data() {
        assert_eq!(parse_body(None, b""), Ok(RequestData::Empty));
        assert_eq!(parse_body(JSON, b""), Ok(RequestData::Empty));
        assert_eq!(parse_body(Some("text/plain"), b""), Ok(RequestData::Empty));
    }

    /// Content-Typeなしのボディは読まれないことを確認
    #[test]
    fn test_body_without_content_type_is_ignored() {
        assert_eq!(parse_body(None, b"[1, 2]"), Ok(RequestData::Empty));
    }

    /// JSONボディがパースされることを確認（charsetパラメータ付きも含む）
    #[test]
    fn test_json_body_is_parsed() {
        assert_eq!(
            parse_body(Some("Application/JSON; charset=utf-8"), br#"{"a": 1}"#),
            Ok(RequestData::Json(serde_json::json!({ "a": 1 })))
        );
    }

    /// 空白のみのJSONボディはパースエラーになることを確認
    #[test]
    fn test_whitespace_json_body_is_malformed() {
        let error = parse_body(JSON, b"   ").unwrap_err();

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert!(error.to_string().starts_with("JSON parse error - "));
    }

    /// 不正なJSONはパースエラーになることを確認
    #[test]
    fn test_malformed_json_body() {
        let error = parse_body(JSON, b"{ invalid json }").unwrap_err();
        assert!(matches!(error, ParseError::Malformed(ref m) if m.starts_with("JSON parse error - ")));
    }

    /// フォームボディは内容に関係なく受け付けられることを確認
    #[test]
    fn test_form_bodies_are_accepted() {
        assert_eq!(
            parse_body(Some("application/x-www-form-urlencoded"), b"name=x&id=9"),
            Ok(RequestData::Form)
        );
        assert_eq!(
            parse_body(
                Some("multipart/form-data; boundary=BoUnDaRyStRiNg"),
                b"--BoUnDaRyStRiNg--\r\n"
            ),
            Ok(RequestData::Form)
        );
    }

    /// boundaryのないmultipartはパースエラーになることを確認
    #[test]
    fn test_multipart_without_boundary_is_malformed() {
        let error = parse_body(Some("multipart/form-data"), b"--x--\r\n").unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    /// 未対応のContent-Typeは415になることを確認
    #[test]
    fn test_unsupported_media_type() {
        let error = parse_body(Some("text/plain"), b"hello").unwrap_err();

        assert_eq!(error.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            error.to_string(),
            "Unsupported media type \"text/plain\" in request."
        );
    }

    // ========================================
    // from_representationのテスト
    // ========================================

    /// 空・フォーム・JSONオブジェクトが有効と判定されることを確認
    #[test]
    fn test_valid_request_data() {
        let cases = [
            RequestData::Empty,
            RequestData::Form,
            RequestData::Json(serde_json::json!({})),
            RequestData::Json(serde_json::json!({ "id": 999, "name": "x" })),
        ];

        for data in cases {
            assert_eq!(ItemSerializer::from_representation(&data), Ok(ItemInput));
        }
    }

    /// オブジェクト以外のJSONはnon_field_errorsになることを確認
    #[test]
    fn test_non_object_json_is_invalid() {
        let cases: [(&[u8], &str); 6] = [
            (b"[1, 2]", "list"),
            (b"\"text\"", "str"),
            (b"1", "int"),
            (b"1.5", "float"),
            (b"true", "bool"),
            (b"null", "NoneType"),
        ];

        for (body, type_name) in cases {
            let data = parse_body(JSON, body).unwrap();
            let errors = ItemSerializer::from_representation(&data).unwrap_err();
            assert_eq!(
                errors.get(NON_FIELD_ERRORS),
                Some(
                    &[format!(
                        "Invalid data. Expected a dictionary, but got {}.",
                        type_name
                    )][..]
                ),
                "想定外のエラー内容: {:?}",
                errors
            );
        }
    }

    /// ValidationErrorsがフィールド名をキーとするJSONになることを確認
    #[test]
    fn test_validation_errors_serialize_as_map() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.add("field", "first");
        errors.add("field", "second");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "field": ["first", "second"] }));
    }
}
