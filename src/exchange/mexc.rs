use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::{Exchange, RawPosition};
use crate::error::BotError;
use crate::models::{
    Candle, EquitySnapshot, Instrument, MarginMode, OrderConfirmation, OrderRequest, Side,
    Ticker, Timeframe,
};

pub const MEXC_CONTRACT_API_BASE: &str = "https://contract.mexc.com";

/// "Requests are too frequent"
const RATE_LIMITED_CODE: i64 = 510;
/// MEXC market order type
const ORDER_TYPE_MARKET: i32 = 5;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type MexcRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API key pair for private endpoints
#[derive(Clone)]
pub struct MexcCredentials {
    pub api_key: String,
    pub secret: String,
}

impl std::fmt::Debug for MexcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MexcCredentials")
            .field("api_key", &"***")
            .field("secret", &"***")
            .finish()
    }
}

/// MEXC perpetual contract REST client
///
/// One long-lived instance is owned by the engine. Public endpoints work without
/// credentials; private ones are signed with HMAC-SHA256 over
/// `api_key + request_time + params`.
#[derive(Clone)]
pub struct MexcClient {
    client: Client,
    base_url: String,
    credentials: Option<MexcCredentials>,
    rate_limiter: Arc<MexcRateLimiter>,
}

/// Envelope around every MEXC contract API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// Columnar kline payload
#[derive(Debug, Deserialize)]
struct KlineData {
    time: Vec<i64>,
    open: Vec<f64>,
    close: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    vol: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractDetail {
    contract_size: f64,
    min_vol: f64,
    vol_unit: f64,
    price_unit: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PositionData {
    symbol: Option<String>,
    /// 1 long, 2 short
    position_type: Option<i32>,
    /// 1 isolated, 2 cross
    open_type: Option<i32>,
    hold_vol: Option<f64>,
    hold_avg_price: Option<f64>,
    leverage: Option<f64>,
    unrealised: Option<f64>,
    profit_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AssetData {
    available_balance: Option<f64>,
    equity: Option<f64>,
}

impl MexcClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<MexcCredentials>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
        })
    }

    fn interval_name(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::Min1 => "Min1",
            Timeframe::Min5 => "Min5",
            Timeframe::Min15 => "Min15",
            Timeframe::Min30 => "Min30",
            Timeframe::Hour1 => "Min60",
            Timeframe::Hour4 => "Hour4",
            Timeframe::Day1 => "Day1",
        }
    }

    /// MEXC order side code: 1 open long, 2 close short, 3 open short, 4 close long
    fn order_side_code(order: &OrderRequest) -> i32 {
        match (order.side, order.reduce_only) {
            (Side::Long, false) => 1,
            (Side::Long, true) => 2,
            (Side::Short, false) => 3,
            (Side::Short, true) => 4,
        }
    }

    fn open_type_code(margin_mode: MarginMode) -> i32 {
        match margin_mode {
            MarginMode::Isolated => 1,
            MarginMode::Cross => 2,
        }
    }

    fn position_type_code(side: Side) -> i32 {
        match side {
            Side::Long => 1,
            Side::Short => 2,
        }
    }

    fn credentials(&self) -> Result<&MexcCredentials, BotError> {
        self.credentials.as_ref().ok_or_else(|| {
            BotError::Configuration("MEXC credentials required for private endpoints".to_string())
        })
    }

    /// Hex HMAC-SHA256 of `api_key + request_time + params`
    fn sign(credentials: &MexcCredentials, request_time: i64, params: &str) -> Result<String, BotError> {
        let mut mac = HmacSha256::new_from_slice(credentials.secret.as_bytes())
            .map_err(|e| BotError::Configuration(format!("HMAC init failed: {}", e)))?;
        mac.update(format!("{}{}{}", credentials.api_key, request_time, params).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Query string with keys sorted, as MEXC expects for signed GETs
    fn query_string(params: &[(&str, String)]) -> String {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signed(&self, request: RequestBuilder, params: &str) -> Result<RequestBuilder, BotError> {
        let credentials = self.credentials()?;
        let request_time = Utc::now().timestamp_millis();
        let signature = Self::sign(credentials, request_time, params)?;

        Ok(request
            .header("ApiKey", &credentials.api_key)
            .header("Request-Time", request_time.to_string())
            .header("Signature", signature)
            .header("Content-Type", "application/json"))
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, BotError> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(self.client.get(&url).query(params)).await
    }

    async fn get_private<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, BotError> {
        let query = Self::query_string(params);
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        let request = self.signed(self.client.get(&url), &query)?;
        self.execute(request).await
    }

    async fn post_private<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Option<T>, BotError> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_string(body)?;
        let request = self.signed(self.client.post(&url), &body)?.body(body);
        self.execute(request).await
    }

    /// Send a request and unwrap the MEXC envelope into the error taxonomy
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, BotError> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(BotError::TransientNetwork(format!("MEXC returned HTTP {}", status)));
        }

        let body = response.text().await?;
        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(BotError::MarketData(format!("Unexpected MEXC payload: {}", e)))
            }
            Err(_) => {
                return Err(BotError::rejection(Some(status.as_u16() as i64), body));
            }
        };

        if !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("MEXC error code {}", envelope.code));
            if envelope.code == RATE_LIMITED_CODE {
                return Err(BotError::TransientNetwork(message));
            }
            return Err(BotError::rejection(Some(envelope.code), message));
        }

        Ok(envelope.data)
    }

    fn require<T>(data: Option<T>, what: &str) -> Result<T, BotError> {
        data.ok_or_else(|| BotError::MarketData(format!("MEXC response missing {}", what)))
    }

    fn candles_from_klines(data: KlineData) -> Result<Vec<Candle>, BotError> {
        let len = data.time.len();
        if [data.open.len(), data.close.len(), data.high.len(), data.low.len(), data.vol.len()]
            .iter()
            .any(|&l| l != len)
        {
            return Err(BotError::MarketData("kline columns have different lengths".to_string()));
        }

        (0..len)
            .map(|i| {
                let timestamp = DateTime::<Utc>::from_timestamp(data.time[i], 0).ok_or_else(|| {
                    BotError::MarketData(format!("invalid kline timestamp {}", data.time[i]))
                })?;
                Ok(Candle {
                    timestamp,
                    open: data.open[i],
                    high: data.high[i],
                    low: data.low[i],
                    close: data.close[i],
                    volume: data.vol[i],
                })
            })
            .collect()
    }

    fn raw_position(data: PositionData) -> RawPosition {
        RawPosition {
            symbol: data.symbol,
            side: data.position_type.map(|t| match t {
                1 => "long".to_string(),
                2 => "short".to_string(),
                other => other.to_string(),
            }),
            contracts: data.hold_vol,
            entry_price: data.hold_avg_price,
            unrealized_pnl: data.unrealised,
            percentage: data.profit_ratio.map(|r| r * 100.0),
            leverage: data.leverage,
            margin_mode: data.open_type.map(|t| match t {
                1 => "isolated".to_string(),
                2 => "cross".to_string(),
                other => other.to_string(),
            }),
        }
    }

    fn order_id(data: Option<Value>) -> String {
        match data {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            Some(Value::Object(map)) => map
                .get("orderId")
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl Exchange for MexcClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, BotError> {
        let end = Utc::now().timestamp();
        let start = end - (limit as i64 + 1) * timeframe.seconds();
        let params = [
            ("interval", Self::interval_name(timeframe).to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
        ];

        let data: Option<KlineData> = self
            .get_public(&format!("/api/v1/contract/kline/{}", symbol), &params)
            .await?;
        let mut candles = Self::candles_from_klines(Self::require(data, "kline data")?)?;

        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        tracing::debug!("Fetched {} candles for {} ({:?})", candles.len(), symbol, timeframe);
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, BotError> {
        let data: Option<TickerData> = self
            .get_public("/api/v1/contract/ticker", &[("symbol", symbol.to_string())])
            .await?;
        let ticker = Self::require(data, "ticker")?;

        Ok(Ticker {
            last_price: ticker.last_price,
        })
    }

    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<RawPosition>, BotError> {
        let data: Option<Vec<PositionData>> = self
            .get_private(
                "/api/v1/private/position/open_positions",
                &[("symbol", symbol.to_string())],
            )
            .await?;

        Ok(data
            .unwrap_or_default()
            .into_iter()
            .map(Self::raw_position)
            .collect())
    }

    async fn fetch_balance(&self, currency: &str) -> Result<EquitySnapshot, BotError> {
        let data: Option<AssetData> = self
            .get_private(&format!("/api/v1/private/account/asset/{}", currency), &[])
            .await?;
        let asset = data.unwrap_or_default();

        Ok(EquitySnapshot {
            available: asset.available_balance.unwrap_or(0.0),
            total: asset.equity.unwrap_or(0.0),
        })
    }

    async fn fetch_instrument(&self, symbol: &str) -> Result<Instrument, BotError> {
        let data: Option<ContractDetail> = self
            .get_public("/api/v1/contract/detail", &[("symbol", symbol.to_string())])
            .await?;
        let detail = Self::require(data, "contract detail")?;

        Ok(Instrument {
            min_qty: detail.min_vol,
            qty_step: detail.vol_unit,
            price_step: detail.price_unit,
            contract_size: detail.contract_size,
        })
    }

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        side: Side,
    ) -> Result<(), BotError> {
        let body = json!({
            "symbol": symbol,
            "leverage": leverage,
            "openType": Self::open_type_code(margin_mode),
            "positionType": Self::position_type_code(side),
        });

        let _: Option<Value> = self
            .post_private("/api/v1/private/position/change_leverage", &body)
            .await?;

        tracing::info!("Leverage set: {} {}x {:?} ({})", symbol, leverage, margin_mode, side);
        Ok(())
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, BotError> {
        let mut body = json!({
            "symbol": order.symbol,
            "price": 0,
            "vol": order.quantity,
            "leverage": order.leverage,
            "side": Self::order_side_code(order),
            "type": ORDER_TYPE_MARKET,
            "openType": Self::open_type_code(order.margin_mode),
            "externalOid": order.client_order_id,
        });
        if let Some(take_profit) = order.take_profit_price {
            body["takeProfitPrice"] = json!(take_profit);
        }
        if let Some(stop_loss) = order.stop_loss_price {
            body["stopLossPrice"] = json!(stop_loss);
        }

        let data: Option<Value> = self
            .post_private("/api/v1/private/order/submit", &body)
            .await?;

        Ok(OrderConfirmation {
            order_id: Self::order_id(data),
            client_order_id: order.client_order_id.clone(),
        })
    }

    fn name(&self) -> &str {
        "mexc"
    }
}
