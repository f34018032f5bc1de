//! Bitunix futures history client.
//!
//! Bitunix signs with a double SHA-256 digest (nonce + timestamp + key +
//! sorted query params, then digest + secret) passed in headers. Its
//! position payloads are shaped differently from the canonical record:
//! net profit is not reported directly and has to be derived from realized
//! P&L, fee, and funding, and there is no explicit fully-closed flag — it
//! is inferred by comparing the closed quantity to the position size.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::domain::entities::provider::Provider;
use crate::domain::entities::sync::SyncWindow;
use crate::domain::entities::trade::{
    parse_decimal, CanonicalTrade, InstrumentKind, OpenPosition, PositionSide,
};
use crate::domain::repositories::provider_client::{
    ProviderClient, ProviderError, ProviderResult,
};
use crate::infrastructure::http_client;
use crate::secrets::ProviderCredentials;

const BITUNIX_API_BASE: &str = "https://fapi.bitunix.com";

// Result codes Bitunix uses for unusable keys.
const CODE_API_KEY_NOT_FOUND: i64 = 10003;
const CODE_SIGNATURE_ERROR: i64 = 10004;
const CODE_KEY_EXPIRED: i64 = 10005;

pub struct BitunixClient {
    client: reqwest::Client,
    api_base: String,
    account_external_id: String,
    credentials: ProviderCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct BitunixEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixTradeListData {
    #[serde(default)]
    trade_list: Vec<BitunixHistoryTrade>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixHistoryTrade {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixPositionListData {
    #[serde(default)]
    position_list: Vec<BitunixPosition>,
}

/// Raw history record. All fields optional: a malformed record is dropped,
/// never fatal for the batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixPosition {
    #[serde(default)]
    position_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    /// "BUY" or "SELL".
    #[serde(default)]
    side: Option<String>,
    /// "ISOLATION" or "CROSS".
    #[serde(default)]
    margin_mode: Option<String>,
    #[serde(default)]
    entry_price: Option<String>,
    #[serde(default)]
    close_price: Option<String>,
    #[serde(default)]
    realized_pnl: Option<String>,
    #[serde(default)]
    fee: Option<String>,
    #[serde(default)]
    funding: Option<String>,
    #[serde(default)]
    max_qty: Option<String>,
    #[serde(default)]
    close_qty: Option<String>,
    #[serde(default)]
    leverage: Option<i64>,
    /// Epoch ms timestamps.
    #[serde(default)]
    ctime: Option<i64>,
    #[serde(default)]
    mtime: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixOpenPositionData {
    #[serde(default)]
    position_list: Vec<BitunixOpenPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitunixOpenPosition {
    #[serde(default)]
    position_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    margin_mode: Option<String>,
    #[serde(default)]
    entry_price: Option<String>,
    #[serde(default)]
    qty: Option<String>,
    #[serde(default)]
    unrealized_pnl: Option<String>,
    #[serde(default)]
    leverage: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BitunixAccountData {}

impl BitunixClient {
    pub fn new(account_external_id: &str, credentials: ProviderCredentials) -> Self {
        Self {
            client: http_client(),
            api_base: BITUNIX_API_BASE.to_string(),
            account_external_id: account_external_id.to_string(),
            credentials,
        }
    }

    /// Double SHA-256 signature: first digest over nonce + timestamp +
    /// api key + the query params sorted by key and concatenated as
    /// `keyvalue`, then a second digest over the first + the secret.
    fn sign(&self, nonce: &str, timestamp: &str, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let query_concat: String = sorted
            .iter()
            .map(|(k, v)| format!("{}{}", k, v))
            .collect();

        let digest = hex::encode(Sha256::digest(
            format!(
                "{}{}{}{}",
                nonce,
                timestamp,
                self.credentials.api_key.as_str(),
                query_concat
            )
            .as_bytes(),
        ));
        hex::encode(Sha256::digest(
            format!("{}{}", digest, self.credentials.api_secret.as_str()).as_bytes(),
        ))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ProviderError::Transport(format!("clock error: {}", e)))?
            .as_millis()
            .to_string();
        let nonce: String = {
            let mut rng = rand::thread_rng();
            (0..32)
                .map(|_| format!("{:x}", rng.gen_range(0..16)))
                .collect()
        };
        let signature = self.sign(&nonce, &timestamp, params);

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let url = if query.is_empty() {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}{}?{}", self.api_base, path, query)
        };

        let response = self
            .client
            .get(&url)
            .header("api-key", self.credentials.api_key.as_str())
            .header("sign", signature)
            .header("nonce", nonce)
            .header("timestamp", timestamp)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::CredentialsRejected {
                provider: "bitunix",
                message: format!("{} - {}", status, body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{} - {}", status, body)));
        }

        let envelope: BitunixEnvelope<T> = response.json().await.map_err(|e| {
            ProviderError::DataShape {
                provider: "bitunix",
                message: format!("unreadable envelope for {}: {}", path, e),
            }
        })?;

        match envelope.code {
            0 => envelope.data.ok_or(ProviderError::DataShape {
                provider: "bitunix",
                message: format!("missing data for {}", path),
            }),
            CODE_API_KEY_NOT_FOUND | CODE_SIGNATURE_ERROR | CODE_KEY_EXPIRED => {
                Err(ProviderError::CredentialsRejected {
                    provider: "bitunix",
                    message: envelope.msg.unwrap_or_else(|| "key rejected".to_string()),
                })
            }
            code => Err(ProviderError::Api {
                provider: "bitunix",
                code,
                message: envelope.msg.unwrap_or_default(),
            }),
        }
    }

    fn normalize(&self, raw: BitunixPosition, coin: &str) -> Option<CanonicalTrade> {
        let position_id = raw.position_id.filter(|id| !id.is_empty())?;
        let symbol = raw.symbol?;
        let position_side = PositionSide::from_str_loose(raw.side.as_deref()?)?;

        let realised_profit = raw.realized_pnl.unwrap_or_else(zero);
        let fee = raw.fee.unwrap_or_else(zero);
        let funding = raw.funding.unwrap_or_else(zero);
        // Bitunix does not report a net figure; derive it the way the
        // canonical shape defines it.
        let net_profit: BigDecimal =
            parse_decimal(&realised_profit) + parse_decimal(&fee) + parse_decimal(&funding);

        let max_qty = raw.max_qty.unwrap_or_else(zero);
        let close_qty = raw.close_qty.unwrap_or_else(zero);
        let fully_closed = !parse_decimal(&close_qty).eq(&BigDecimal::from(0))
            && parse_decimal(&close_qty) == parse_decimal(&max_qty);

        Some(CanonicalTrade {
            account_external_id: self.account_external_id.clone(),
            position_id,
            coin: coin.to_string(),
            symbol,
            position_side,
            isolated: raw.margin_mode.as_deref() == Some("ISOLATION"),
            open_time: raw.ctime.unwrap_or_default(),
            update_time: raw.mtime.unwrap_or_default(),
            avg_price: raw.entry_price.unwrap_or_else(zero),
            avg_close_price: raw.close_price.unwrap_or_else(zero),
            realised_profit,
            net_profit: net_profit.to_string(),
            position_amt: max_qty,
            close_position_amt: close_qty,
            leverage: raw.leverage.unwrap_or(1),
            close_all_positions: fully_closed,
            position_commission: fee,
            total_funding: funding,
            instrument: InstrumentKind::Perpetual,
        })
    }
}

#[async_trait]
impl ProviderClient for BitunixClient {
    fn provider(&self) -> Provider {
        Provider::Bitunix
    }

    async fn credentials_valid(&self, coin: &str) -> ProviderResult<bool> {
        let params = [("marginCoin", coin.to_string())];
        match self
            .get::<BitunixAccountData>("/api/v1/futures/account", &params)
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
            ("marginCoin", coin.to_string()),
            ("startTime", window.start_ms.to_string()),
            ("endTime", window.end_ms.to_string()),
        ];
        let data: BitunixTradeListData = self
            .get("/api/v1/futures/trade/get_history_trades", &params)
            .await?;

        Ok(data
            .trade_list
            .into_iter()
            .filter_map(|trade| trade.symbol)
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
            ("marginCoin", coin.to_string()),
            ("startTime", window.start_ms.to_string()),
            ("endTime", window.end_ms.to_string()),
        ];
        let data: BitunixPositionListData = self
            .get("/api/v1/futures/position/get_history_positions", &params)
            .await?;

        let mut trades = Vec::with_capacity(data.position_list.len());
        for raw in data.position_list {
            match self.normalize(raw, coin) {
                Some(trade) => trades.push(trade),
                None => warn!("Dropping malformed bitunix position record for {}", symbol),
            }
        }
        Ok(trades)
    }

    async fn list_open_positions(&self, coin: &str) -> ProviderResult<Vec<OpenPosition>> {
        let params = [("marginCoin", coin.to_string())];
        let data: BitunixOpenPositionData = self
            .get("/api/v1/futures/position/get_pending_positions", &params)
            .await?;

        let mut positions = Vec::with_capacity(data.position_list.len());
        for raw in data.position_list {
            let (Some(position_id), Some(symbol), Some(side)) = (
                raw.position_id.filter(|id| !id.is_empty()),
                raw.symbol,
                raw.side.as_deref().and_then(PositionSide::from_str_loose),
            ) else {
                warn!("Dropping malformed bitunix open position record");
                continue;
            };
            positions.push(OpenPosition {
                provider: Provider::Bitunix,
                position_id,
                symbol,
                coin: coin.to_string(),
                position_side: side,
                isolated: raw.margin_mode.as_deref() == Some("ISOLATION"),
                avg_price: raw.entry_price.unwrap_or_else(zero),
                position_amt: raw.qty.unwrap_or_else(zero),
                unrealised_profit: raw.unrealized_pnl.unwrap_or_else(zero),
                leverage: raw.leverage.unwrap_or(1),
            });
        }
        Ok(positions)
    }
}

fn zero() -> String {
    "0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BitunixClient {
        BitunixClient::new("acct-9", ProviderCredentials::new("test_key", "test_secret"))
    }

    #[test]
    fn test_sign_is_deterministic_and_hex() {
        let params = [("symbol", "BTCUSDT".to_string())];
        let a = client().sign("nonce", "1700000000000", &params);
        let b = client().sign("nonce", "1700000000000", &params);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_sorts_params_by_key() {
        let ordered = [
            ("endTime", "2".to_string()),
            ("startTime", "1".to_string()),
        ];
        let reversed = [
            ("startTime", "1".to_string()),
            ("endTime", "2".to_string()),
        ];
        let a = client().sign("n", "t", &ordered);
        let b = client().sign("n", "t", &reversed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_derives_net_profit() {
        let raw: BitunixPosition = serde_json::from_str(
            r#"{
                "positionId": "12001",
                "symbol": "BTCUSDT",
                "side": "BUY",
                "marginMode": "ISOLATION",
                "entryPrice": "42000",
                "closePrice": "42100",
                "realizedPnl": "15.3",
                "fee": "-0.4",
                "funding": "-0.1",
                "maxQty": "0.1",
                "closeQty": "0.1",
                "leverage": 10,
                "ctime": 1704412800000,
                "mtime": 1704416400000
            }"#,
        )
        .unwrap();

        let trade = client().normalize(raw, "USDT").unwrap();
        assert_eq!(trade.position_id, "12001");
        assert_eq!(trade.net_profit, "14.8");
        assert_eq!(trade.realised_profit, "15.3");
        assert_eq!(trade.position_commission, "-0.4");
        assert_eq!(trade.total_funding, "-0.1");
        assert_eq!(trade.position_side, PositionSide::Long);
        assert!(trade.isolated);
        assert!(trade.close_all_positions);
        assert_eq!(trade.account_external_id, "acct-9");
    }

    #[test]
    fn test_normalize_partial_close_is_not_fully_closed() {
        let raw: BitunixPosition = serde_json::from_str(
            r#"{
                "positionId": "12002",
                "symbol": "BTCUSDT",
                "side": "SELL",
                "maxQty": "0.2",
                "closeQty": "0.1"
            }"#,
        )
        .unwrap();

        let trade = client().normalize(raw, "USDT").unwrap();
        assert!(!trade.close_all_positions);
        assert_eq!(trade.position_side, PositionSide::Short);
    }

    #[test]
    fn test_normalize_zero_quantities_are_not_fully_closed() {
        let raw: BitunixPosition = serde_json::from_str(
            r#"{"positionId": "12003", "symbol": "BTCUSDT", "side": "BUY"}"#,
        )
        .unwrap();
        let trade = client().normalize(raw, "USDT").unwrap();
        assert!(!trade.close_all_positions);
    }

    #[test]
    fn test_normalize_drops_record_without_id() {
        let raw: BitunixPosition =
            serde_json::from_str(r#"{"symbol": "BTCUSDT", "side": "BUY"}"#).unwrap();
        assert!(client().normalize(raw, "USDT").is_none());

        let raw: BitunixPosition =
            serde_json::from_str(r#"{"positionId": "", "symbol": "BTCUSDT", "side": "BUY"}"#)
                .unwrap();
        assert!(client().normalize(raw, "USDT").is_none());
    }

    #[test]
    fn test_envelope_with_credential_code() {
        let envelope: BitunixEnvelope<BitunixPositionListData> =
            serde_json::from_str(r#"{"code": 10003, "msg": "api key not found"}"#).unwrap();
        assert_eq!(envelope.code, CODE_API_KEY_NOT_FOUND);
    }

    #[test]
    fn test_cross_margin_is_not_isolated() {
        let raw: BitunixPosition = serde_json::from_str(
            r#"{"positionId": "1", "symbol": "ETHUSDT", "side": "BUY", "marginMode": "CROSS"}"#,
        )
        .unwrap();
        let trade = client().normalize(raw, "USDT").unwrap();
        assert!(!trade.isolated);
    }
}
