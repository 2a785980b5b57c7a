//! API facade
//!
//! `LedgerService` translates external requests into [`LedgerEngine`] calls.
//! It validates raw input into domain types, so nothing malformed reaches
//! the engine, and maps every outcome onto an [`ApiResponse`] carrying either
//! the payload or a reason code with a message.
//!
//! Any transport can carry these calls; [`LedgerService::handle_json`] is the
//! JSON entry point used by the `serve` command.

pub mod models;

pub use models::{
    AccountQuery, ApiRequest, ApiResponse, LoginRequest, TransferBody, TransferReceipt,
};

use crate::core::LedgerEngine;
use crate::types::{Account, AccountId, LedgerError, MinorUnits, Transaction, TransferRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

const TRANSFER_SUCCEEDED: &str = "Transaction successful.";

#[derive(Debug, Clone)]
pub struct LedgerService {
    engine: Arc<LedgerEngine>,
}

impl LedgerService {
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    /// Return the account, creating it on first login
    ///
    /// A missing initial balance opens the account empty.
    pub async fn register_or_login(&self, request: LoginRequest) -> ApiResponse<Account> {
        self.login(&request).await.into()
    }

    pub async fn transfer(&self, body: TransferBody) -> ApiResponse<TransferReceipt> {
        match self.submit(&body).await {
            Ok(receipt) => ApiResponse::success(receipt).with_message(TRANSFER_SUCCEEDED),
            Err(e) => ApiResponse::failure(&e),
        }
    }

    pub async fn get_account(&self, query: AccountQuery) -> ApiResponse<Account> {
        self.account(&query).await.into()
    }

    /// Transactions involving the account, oldest first
    pub async fn get_transactions(&self, query: AccountQuery) -> ApiResponse<Vec<Transaction>> {
        self.history(&query).await.into()
    }

    /// Dispatch one JSON request and return the JSON response
    ///
    /// Malformed JSON or an unknown `op` yields an `INVALID_REQUEST` failure.
    pub async fn handle_json(&self, line: &str) -> String {
        let request: ApiRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                let error = LedgerError::invalid_request(e.to_string());
                return encode(&ApiResponse::<()>::failure(&error));
            }
        };

        debug!(?request, "api request");
        match request {
            ApiRequest::Login(login) => encode(&self.register_or_login(login).await),
            ApiRequest::Transfer(body) => encode(&self.transfer(body).await),
            ApiRequest::GetAccount(query) => encode(&self.get_account(query).await),
            ApiRequest::GetTransactions(query) => encode(&self.get_transactions(query).await),
        }
    }
}

/// Validation and engine calls
impl LedgerService {
    async fn login(&self, request: &LoginRequest) -> Result<Account, LedgerError> {
        let id = AccountId::parse(&request.account_id)?;
        let initial_balance = opening_balance(request.initial_balance)?;
        self.engine.register_or_login(&id, initial_balance).await
    }

    async fn submit(&self, body: &TransferBody) -> Result<TransferReceipt, LedgerError> {
        let request = TransferRequest::parse(
            &body.from,
            &body.to,
            body.amount,
            body.client_request_id.as_deref(),
        )?;
        let outcome = self.engine.transfer(request).await?;
        Ok(TransferReceipt {
            transaction: outcome.transaction,
            replayed: outcome.replayed,
        })
    }

    async fn account(&self, query: &AccountQuery) -> Result<Account, LedgerError> {
        let id = AccountId::parse(&query.account_id)?;
        self.engine.get_account(&id).await
    }

    async fn history(&self, query: &AccountQuery) -> Result<Vec<Transaction>, LedgerError> {
        let id = AccountId::parse(&query.account_id)?;
        Ok(self.engine.transactions_for(&id).await?.collect())
    }
}

fn opening_balance(initial_balance: Option<i64>) -> Result<MinorUnits, LedgerError> {
    let amount = initial_balance.unwrap_or(0);
    MinorUnits::try_from(amount).map_err(|_| LedgerError::invalid_amount(amount))
}

fn encode<T: Serialize>(response: &ApiResponse<T>) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("failed to encode api response: {e}");
        r#"{"ok":false,"reason":"INVALID_REQUEST","message":"response could not be encoded"}"#
            .to_string()
    })
}
