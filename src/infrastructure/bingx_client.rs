//! BingX perpetual-futures history client.
//!
//! Signs requests with HMAC-SHA256 over the query string and normalizes
//! the swap-API payloads into canonical trades. BingX reports the position
//! history fields the canonical shape was modeled on, so normalization is
//! mostly field-by-field with defensive handling of the id field, which
//! the API returns either as a number or a string.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::domain::entities::provider::Provider;
use crate::domain::entities::sync::SyncWindow;
use crate::domain::entities::trade::{
    CanonicalTrade, InstrumentKind, OpenPosition, PositionSide,
};
use crate::domain::repositories::provider_client::{
    ProviderClient, ProviderError, ProviderResult,
};
use crate::infrastructure::http_client;
use crate::secrets::ProviderCredentials;

const BINGX_API_BASE: &str = "https://open-api.bingx.com";

// Result codes BingX uses for unusable keys.
const CODE_INVALID_KEY: i64 = 100413;
const CODE_SIGNATURE_MISMATCH: i64 = 100421;
const CODE_PERMISSION_DENIED: i64 = 100419;

/// Client for the BingX swap API, bound to one account's credentials.
pub struct BingxClient {
    client: reqwest::Client,
    api_base: String,
    account_external_id: String,
    credentials: ProviderCredentials,
}

/// Common response envelope: every endpoint wraps its payload in
/// `{code, msg, data}` with code 0 on success.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct BingxEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingxFillOrdersData {
    #[serde(default)]
    fill_orders: Vec<BingxFillOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingxFillOrder {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingxPositionHistoryData {
    #[serde(default)]
    position_history: Vec<BingxPositionHistory>,
}

/// Raw position-history record. Everything is optional so one malformed
/// record degrades to a dropped record instead of a failed batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingxPositionHistory {
    #[serde(default)]
    position_id: Option<serde_json::Value>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    position_side: Option<String>,
    #[serde(default)]
    isolated: bool,
    #[serde(default)]
    open_time: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    avg_close_price: Option<String>,
    #[serde(default)]
    realised_profit: Option<String>,
    #[serde(default)]
    net_profit: Option<String>,
    #[serde(default)]
    position_amt: Option<String>,
    #[serde(default)]
    close_position_amt: Option<String>,
    #[serde(default)]
    leverage: Option<i64>,
    #[serde(default)]
    close_all_positions: bool,
    #[serde(default)]
    position_commission: Option<String>,
    #[serde(default)]
    total_funding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingxOpenPosition {
    #[serde(default)]
    position_id: Option<serde_json::Value>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    position_side: Option<String>,
    #[serde(default)]
    isolated: bool,
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    position_amt: Option<String>,
    #[serde(default)]
    unrealized_profit: Option<String>,
    #[serde(default)]
    leverage: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BingxBalanceData {}

impl BingxClient {
    pub fn new(account_external_id: &str, credentials: ProviderCredentials) -> Self {
        Self {
            client: http_client(),
            api_base: BINGX_API_BASE.to_string(),
            account_external_id: account_external_id.to_string(),
            credentials,
        }
    }

    /// Build the signed query: parameters in insertion order, a trailing
    /// timestamp, then an HMAC-SHA256 hex signature over the whole string.
    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ProviderError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ProviderError::Transport(format!("clock error: {}", e)))?
            .as_millis();

        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={}", timestamp));

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| ProviderError::Transport(format!("HMAC error: {}", e)))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query, signature))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let query = self.signed_query(params)?;
        let url = format!("{}{}?{}", self.api_base, path, query);

        let response = self
            .client
            .get(&url)
            .header("X-BX-APIKEY", self.credentials.api_key.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::CredentialsRejected {
                provider: "bingx",
                message: format!("{} - {}", status, body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{} - {}", status, body)));
        }

        let envelope: BingxEnvelope<T> = response.json().await.map_err(|e| {
            ProviderError::DataShape {
                provider: "bingx",
                message: format!("unreadable envelope for {}: {}", path, e),
            }
        })?;

        match envelope.code {
            0 => envelope.data.ok_or(ProviderError::DataShape {
                provider: "bingx",
                message: format!("missing data for {}", path),
            }),
            CODE_INVALID_KEY | CODE_SIGNATURE_MISMATCH | CODE_PERMISSION_DENIED => {
                Err(ProviderError::CredentialsRejected {
                    provider: "bingx",
                    message: envelope.msg.unwrap_or_else(|| "key rejected".to_string()),
                })
            }
            code => Err(ProviderError::Api {
                provider: "bingx",
                code,
                message: envelope.msg.unwrap_or_default(),
            }),
        }
    }

    /// Normalize one raw record; `None` drops it (with a warning at the
    /// call site) rather than failing the batch.
    fn normalize(&self, raw: BingxPositionHistory, coin: &str) -> Option<CanonicalTrade> {
        let position_id = raw.position_id.as_ref().and_then(json_id)?;
        let symbol = raw.symbol?;
        let position_side = PositionSide::from_str_loose(raw.position_side.as_deref()?)?;

        Some(CanonicalTrade {
            account_external_id: self.account_external_id.clone(),
            position_id,
            coin: coin.to_string(),
            symbol,
            position_side,
            isolated: raw.isolated,
            open_time: raw.open_time.unwrap_or_default(),
            update_time: raw.update_time.unwrap_or_default(),
            avg_price: raw.avg_price.unwrap_or_else(zero),
            avg_close_price: raw.avg_close_price.unwrap_or_else(zero),
            realised_profit: raw.realised_profit.unwrap_or_else(zero),
            net_profit: raw.net_profit.unwrap_or_else(zero),
            position_amt: raw.position_amt.unwrap_or_else(zero),
            close_position_amt: raw.close_position_amt.unwrap_or_else(zero),
            leverage: raw.leverage.unwrap_or(1),
            close_all_positions: raw.close_all_positions,
            position_commission: raw.position_commission.unwrap_or_else(zero),
            total_funding: raw.total_funding.unwrap_or_else(zero),
            instrument: InstrumentKind::Perpetual,
        })
    }
}

#[async_trait]
impl ProviderClient for BingxClient {
    fn provider(&self) -> Provider {
        Provider::Bingx
    }

    async fn credentials_valid(&self, coin: &str) -> ProviderResult<bool> {
        let params = [("currency", coin.to_string())];
        match self
            .get::<BingxBalanceData>("/openApi/swap/v2/user/balance", &params)
            .await
        {
            Ok(_) => Ok(true),
            Err(ProviderError::CredentialsRejected { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_filled_order_symbols(
        &self,
        coin: &str,
        window: SyncWindow,
    ) -> ProviderResult<BTreeSet<String>> {
        let params = [
            ("currency", coin.to_string()),
            ("startTs", window.start_ms.to_string()),
            ("endTs", window.end_ms.to_string()),
        ];
        let data: BingxFillOrdersData = self
            .get("/openApi/swap/v2/trade/allFillOrders", &params)
            .await?;

        Ok(data
            .fill_orders
            .into_iter()
            .filter_map(|order| order.symbol)
            .collect())
    }

    async fn fetch_position_history(
        &self,
        symbol: &str,
        coin: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<CanonicalTrade>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("currency", coin.to_string()),
            ("startTs", window.start_ms.to_string()),
            ("endTs", window.end_ms.to_string()),
        ];
        let data: BingxPositionHistoryData = self
            .get("/openApi/swap/v1/trade/positionHistory", &params)
            .await?;

        let mut trades = Vec::with_capacity(data.position_history.len());
        for raw in data.position_history {
            match self.normalize(raw, coin) {
                Some(trade) => trades.push(trade),
                None => warn!("Dropping malformed bingx position record for {}", symbol),
            }
        }
        Ok(trades)
    }

    async fn list_open_positions(&self, coin: &str) -> ProviderResult<Vec<OpenPosition>> {
        let params = [("currency", coin.to_string())];
        let data: Vec<BingxOpenPosition> =
            self.get("/openApi/swap/v2/user/positions", &params).await?;

        let mut positions = Vec::with_capacity(data.len());
        for raw in data {
            let (Some(position_id), Some(symbol), Some(side)) = (
                raw.position_id.as_ref().and_then(json_id),
                raw.symbol,
                raw.position_side
                    .as_deref()
                    .and_then(PositionSide::from_str_loose),
            ) else {
                warn!("Dropping malformed bingx open position record");
                continue;
            };
            positions.push(OpenPosition {
                provider: Provider::Bingx,
                position_id,
                symbol,
                coin: coin.to_string(),
                position_side: side,
                isolated: raw.isolated,
                avg_price: raw.avg_price.unwrap_or_else(zero),
                position_amt: raw.position_amt.unwrap_or_else(zero),
                unrealised_profit: raw.unrealized_profit.unwrap_or_else(zero),
                leverage: raw.leverage.unwrap_or(1),
            });
        }
        Ok(positions)
    }
}

/// BingX serializes ids as either JSON numbers or strings.
fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn zero() -> String {
    "0".to_string()
}
