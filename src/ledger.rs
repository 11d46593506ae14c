use crate::{
    errors::RemoteError,
    identity::Delegation,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Contract of the remote ledger/game service.
///
/// `get_balance` is a query call and never mutates remote state.
/// `flip_coin` is an update call with no idempotency: every invocation
/// stakes `bet_amount` exactly once.
pub trait LedgerService: Send + Sync + 'static {
    fn get_balance(
        &self,
        caller: &Delegation,
    ) -> impl Future<Output = Result<u64, RemoteError>> + Send;

    fn flip_coin(
        &self,
        caller: &Delegation,
        bet_amount: u64,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

#[derive(Clone)]
pub struct HttpLedger {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for ledger")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_body(res: reqwest::Response) -> Result<Vec<u8>, RemoteError> {
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

impl LedgerService for HttpLedger {
    async fn get_balance(&self, caller: &Delegation) -> Result<u64, RemoteError> {
        let url = format!("{}/balance", self.base_url);
        let res = self
            .http
            .get(url)
            .bearer_auth(&caller.token)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let bytes = Self::read_body(res).await?;
        let dto: BalanceDto = serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(dto.balance)
    }

    async fn flip_coin(
        &self,
        caller: &Delegation,
        bet_amount: u64,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/flip", self.base_url);
        let res = self
            .http
            .post(url)
            .bearer_auth(&caller.token)
            .json(&FlipRequestDto { bet_amount })
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let bytes = Self::read_body(res).await?;
        let dto: FlipResponseDto = serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(dto.message)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceDto {
    balance: u64,
}

#[derive(Debug, Serialize)]
struct FlipRequestDto {
    bet_amount: u64,
}

#[derive(Debug, Deserialize)]
struct FlipResponseDto {
    message: String,
}
