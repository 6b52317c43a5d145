//! Binance REST Client
//!
//! Signed spot endpoints used by the executor:
//! - `POST /api/v3/order`   MARKET order, `newOrderRespType=FULL`
//! - `GET  /api/v3/account` free balances
//!
//! Requests carry `X-MBX-APIKEY` and an HMAC-SHA256 `signature` over the query
//! string. HTTP 418/429 surface as `ArbError::RateLimit`.
//!
//! Failures split by what they say about the order. A 4xx with Binance's
//! error body is a definite rejection (`ArbError::Venue`). A timeout, a lost
//! response or a 5xx leaves the order in an unknown state
//! (`ArbError::OutcomeUnknown`): it may have executed.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::balances::VenueBalances;
use crate::error::{ArbError, Result};
use crate::types::{BotConfig, Side};
use crate::venues::{CexVenue, Fill, FillReport, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const VENUE: &str = "binance";
const RECV_WINDOW_MS: u64 = 5_000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    #[serde(with = "rust_decimal::serde::str")]
    orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    executed_qty: Decimal,
    #[serde(default)]
    fills: Vec<FillResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillResponse {
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    commission: Decimal,
    commission_asset: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    free: Decimal,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

impl OrderResponse {
    fn into_report(self, side: Side) -> FillReport {
        FillReport {
            order_id: self.order_id.to_string(),
            side,
            status: OrderStatus::parse(&self.status),
            requested_qty: self.orig_qty,
            executed_qty: self.executed_qty,
            fills: self
                .fills
                .into_iter()
                .map(|f| Fill {
                    price: f.price,
                    qty: f.qty,
                    commission: f.commission,
                    commission_asset: f.commission_asset,
                })
                .collect(),
        }
    }
}

impl AccountResponse {
    fn free(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

// ── Client ────────────────────────────────────────────────────────────

pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    symbol: String,
    base_asset: String,
    quote_asset: String,
}

impl BinanceClient {
    pub fn new(config: &BotConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ArbError::venue(VENUE, format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.cex_rest_url.trim_end_matches('/').to_string(),
            api_key: config.cex_api_key.clone(),
            api_secret: config.cex_api_secret.clone(),
            symbol: config.cex_symbol.clone(),
            base_asset: config.base_symbol.clone(),
            quote_asset: config.quote_symbol.clone(),
        })
    }

    async fn signed<T: DeserializeOwned>(&self, method: Method, path: &str, params: &str) -> Result<T> {
        let query = if params.is_empty() {
            format!("recvWindow={}&timestamp={}", RECV_WINDOW_MS, Utc::now().timestamp_millis())
        } else {
            format!(
                "{}&recvWindow={}&timestamp={}",
                params,
                RECV_WINDOW_MS,
                Utc::now().timestamp_millis()
            )
        };
        let signature = sign_query(&self.api_secret, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| send_error(path, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArbError::outcome_unknown(VENUE, format!("{} body read failed: {}", path, e)))?;

        check_status(path, status, &body)?;

        serde_json::from_str(&body)
            .map_err(|e| ArbError::outcome_unknown(VENUE, format!("{} unexpected response: {}", path, e)))
    }
}

/// Connect and build failures never left the process; anything later may have.
fn send_error(path: &str, e: &reqwest::Error) -> ArbError {
    if e.is_connect() || e.is_builder() {
        ArbError::venue(VENUE, format!("{} request not sent: {}", path, e))
    } else {
        ArbError::outcome_unknown(VENUE, format!("{} request failed: {}", path, e))
    }
}

fn check_status(path: &str, status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        warn!("🚫 Binance rate limit on {} (HTTP {})", path, status.as_u16());
        return Err(ArbError::RateLimit {
            venue: VENUE,
            status: status.as_u16(),
        });
    }
    if status.is_success() {
        return Ok(());
    }

    let api = serde_json::from_str::<ApiError>(body).ok();
    let message = match &api {
        Some(api) => format!("{} HTTP {} code {}: {}", path, status.as_u16(), api.code, api.msg),
        None => format!("{} HTTP {}: {}", path, status.as_u16(), body),
    };
    // Binance answers 5xx (and -1007 timeouts) when execution status is unknown.
    if status.is_server_error() || api.as_ref().is_some_and(|a| a.code == -1007) {
        return Err(ArbError::outcome_unknown(VENUE, message));
    }
    Err(ArbError::venue(VENUE, message))
}

/// Hex HMAC-SHA256 of the query string.
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ArbError::venue(VENUE, format!("bad api secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl CexVenue for BinanceClient {
    fn name(&self) -> &'static str {
        VENUE
    }

    async fn place_order(&self, side: Side, quantity: Decimal) -> Result<FillReport> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newOrderRespType=FULL",
            self.symbol,
            side,
            quantity.normalize()
        );
        debug!("Binance order: {}", params);

        let response: OrderResponse = self.signed(Method::POST, "/api/v3/order", &params).await?;
        let report = response.into_report(side);
        info!(
            "📒 Binance {} {} {}: status {:?}, executed {}, avg price {:?}",
            side, quantity, self.symbol, report.status, report.executed_qty, report.avg_price()
        );
        Ok(report)
    }

    async fn get_balances(&self) -> Result<VenueBalances> {
        let account: AccountResponse = self.signed(Method::GET, "/api/v3/account", "").await?;
        Ok(VenueBalances {
            base: account.free(&self.base_asset),
            quote: account.free(&self.quote_asset),
        })
    }
}
