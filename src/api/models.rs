//! Request and response bodies of the ledger API
//!
//! Requests arrive as raw strings and numbers and are validated into domain
//! types by [`LedgerService`](super::LedgerService) before they reach the
//! engine. The camelCase field names of the legacy HTTP API are accepted as
//! aliases.

use crate::types::{LedgerError, ReasonCode, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "phoneNum", alias = "accountId")]
    pub account_id: String,
    #[serde(default, alias = "initialAmount", alias = "initialBalance")]
    pub initial_balance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferBody {
    pub from: String,
    pub to: String,
    pub amount: i64,
    #[serde(default, alias = "clientRequestId", alias = "idempotency_key")]
    pub client_request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountQuery {
    #[serde(alias = "phoneNum", alias = "accountId")]
    pub account_id: String,
}

/// A request tagged by its `op` field
///
/// ```json
/// {"op":"transfer","from":"5550001","to":"5550002","amount":300,"client_request_id":"r1"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    Login(LoginRequest),
    Transfer(TransferBody),
    GetAccount(AccountQuery),
    GetTransactions(AccountQuery),
}

/// Successful transfer result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub transaction: Transaction,
    /// True when an earlier request with the same key produced this result
    pub replayed: bool,
}

/// Envelope for every API response
///
/// Failures always carry a reason code and a readable message; successes
/// carry the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            reason: None,
            message: None,
        }
    }

    pub fn failure(error: &LedgerError) -> Self {
        Self {
            ok: false,
            data: None,
            reason: Some(error.code()),
            message: Some(error.to_string()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> From<Result<T, LedgerError>> for ApiResponse<T> {
    fn from(result: Result<T, LedgerError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::snake_case(r#"{"op":"login","account_id":"5550001","initial_balance":1000}"#)]
    #[case::legacy_names(r#"{"op":"login","phoneNum":"5550001","initialAmount":1000}"#)]
    fn test_login_request_accepts_aliases(#[case] json: &str) {
        let request: ApiRequest = serde_json::from_str(json).unwrap();

        assert_eq!(
            request,
            ApiRequest::Login(LoginRequest {
                account_id: "5550001".to_string(),
                initial_balance: Some(1000),
            })
        );
    }

    #[test]
    fn test_transfer_request_key_is_optional() {
        let json = r#"{"op":"transfer","from":"5550001","to":"5550002","amount":300}"#;

        let request: ApiRequest = serde_json::from_str(json).unwrap();

        let ApiRequest::Transfer(body) = request else {
            panic!("expected a transfer request");
        };
        assert_eq!(body.amount, 300);
        assert_eq!(body.client_request_id, None);
    }

    #[rstest]
    #[case::unknown_op(r#"{"op":"withdraw","account_id":"5550001"}"#)]
    #[case::missing_op(r#"{"account_id":"5550001"}"#)]
    #[case::fractional_amount(r#"{"op":"transfer","from":"1","to":"2","amount":1.5}"#)]
    #[case::string_amount(r#"{"op":"transfer","from":"1","to":"2","amount":"10"}"#)]
    fn test_malformed_requests_are_rejected(#[case] json: &str) {
        assert!(serde_json::from_str::<ApiRequest>(json).is_err());
    }

    #[test]
    fn test_failure_response_shape() {
        let response: ApiResponse<()> = ApiResponse::failure(&LedgerError::invalid_amount(0));

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "INVALID_AMOUNT");
        assert!(json.get("data").is_none());
        assert!(json["message"].as_str().unwrap().contains("positive"));
    }

    #[test]
    fn test_success_response_omits_reason() {
        let response = ApiResponse::success(42u64);

        let json = serde_json::to_string(&response).unwrap();

        assert_eq!(json, r#"{"ok":true,"data":42}"#);
    }
}
