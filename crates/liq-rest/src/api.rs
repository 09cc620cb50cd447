//! Typed endpoint surface.
//!
//! Every call goes through the rate limiter with the priority and
//! weight the venue assigns to the endpoint. CRITICAL is order
//! placement/cancellation, HIGH position-state, MEDIUM account reads,
//! LOW market data.

use crate::client::{RawResponse, RequestSpec, Security};
use crate::error::{RestError, RestResult};
use crate::limiter::RateLimiter;
use crate::model::{
    AccountBalance, AccountInfo, ApiErrorBody, BookTicker, DepthSnapshot, ExchangeInfo, Kline,
    ListenKeyResponse, OpenOrder, OrderAck, PositionModeResponse, PositionRisk,
};
use crate::sign::Params;
use liq_core::{ClientOrderId, OrderType, PositionSide, Price, Priority, Qty, Side, TimeInForce};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Production REST base.
pub const BASE_URL: &str = "https://fapi.asterdex.com";

/// Maximum orders per batch request.
pub const MAX_BATCH_ORDERS: usize = 5;

/// An order to place, before precision formatting is applied.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub qty: Option<Qty>,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: Option<TimeInForce>,
    /// Only valid in one-way mode; omitted from the wire when false.
    pub reduce_only: bool,
    /// Trigger orders use the mark price and price protection.
    pub mark_price_trigger: bool,
    pub client_order_id: ClientOrderId,
}

impl NewOrder {
    pub fn new(symbol: impl Into<String>, side: Side, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            position_side: PositionSide::Both,
            order_type,
            qty: None,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            mark_price_trigger: false,
            client_order_id: ClientOrderId::new(),
        }
    }

    pub fn position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = position_side;
        self
    }

    pub fn qty(mut self, qty: Qty) -> Self {
        self.qty = Some(qty);
        self
    }

    pub fn price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop_price(mut self, stop_price: Price) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn mark_price_trigger(mut self) -> Self {
        self.mark_price_trigger = true;
        self
    }

    /// Wire parameters in the order the venue documents them.
    fn params(&self) -> Params {
        let mut params = Params::new();
        params
            .push("symbol", &self.symbol)
            .push("side", self.side.as_str())
            .push("positionSide", self.position_side.as_str())
            .push("type", self.order_type.as_str());
        params.push_opt("quantity", self.qty.map(|q| q.inner()));
        params.push_opt("price", self.price.map(|p| p.inner()));
        params.push_opt("timeInForce", self.time_in_force.map(|t| t.as_str()));
        params.push_opt("stopPrice", self.stop_price.map(|p| p.inner()));
        if self.reduce_only {
            params.push("reduceOnly", "true");
        }
        if self.mark_price_trigger {
            params.push("workingType", "MARK_PRICE");
            params.push("priceProtect", "TRUE");
        }
        params.push("newClientOrderId", self.client_order_id.as_str());
        params
    }

    /// JSON object form for the batch endpoint.
    fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("symbol".into(), self.symbol.clone().into());
        obj.insert("side".into(), self.side.as_str().into());
        obj.insert("positionSide".into(), self.position_side.as_str().into());
        obj.insert("type".into(), self.order_type.as_str().into());
        if let Some(qty) = self.qty {
            obj.insert("quantity".into(), qty.inner().to_string().into());
        }
        if let Some(price) = self.price {
            obj.insert("price".into(), price.inner().to_string().into());
        }
        if let Some(tif) = self.time_in_force {
            obj.insert("timeInForce".into(), tif.as_str().into());
        }
        if let Some(stop) = self.stop_price {
            obj.insert("stopPrice".into(), stop.inner().to_string().into());
        }
        if self.reduce_only {
            obj.insert("reduceOnly".into(), "true".into());
        }
        if self.mark_price_trigger {
            obj.insert("workingType".into(), "MARK_PRICE".into());
            obj.insert("priceProtect".into(), "TRUE".into());
        }
        obj.insert(
            "newClientOrderId".into(),
            self.client_order_id.as_str().into(),
        );
        Value::Object(obj)
    }
}

/// Typed API over the rate-limited transport.
#[derive(Clone)]
pub struct ExchangeApi {
    limiter: RateLimiter,
}

impl ExchangeApi {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    async fn fetch<T: DeserializeOwned>(&self, spec: RequestSpec) -> RestResult<T> {
        let response = self.limiter.submit(spec).await?;
        parse(&response)
    }

    // --- Orders (CRITICAL) ---

    /// `POST /fapi/v1/order`.
    pub async fn place_order(&self, order: &NewOrder) -> RestResult<OrderAck> {
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/order", Security::Signed)
            .params(order.params())
            .priority(Priority::Critical)
            .weight(1)
            .order();
        self.fetch(spec).await
    }

    /// `POST /fapi/v1/batchOrders`. Results are per-item: a batch is
    /// never all-or-nothing on this venue.
    pub async fn place_batch_orders(
        &self,
        orders: &[NewOrder],
    ) -> RestResult<Vec<RestResult<OrderAck>>> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        if orders.len() > MAX_BATCH_ORDERS {
            return Err(RestError::Validation(format!(
                "batch of {} exceeds maximum of {MAX_BATCH_ORDERS}",
                orders.len()
            )));
        }
        let batch: Vec<Value> = orders.iter().map(NewOrder::to_json).collect();
        let mut params = Params::new();
        params.push(
            "batchOrders",
            serde_json::to_string(&batch)
                .map_err(|e| RestError::Validation(format!("unserializable batch: {e}")))?,
        );
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/batchOrders", Security::Signed)
            .params(params)
            .priority(Priority::Critical)
            .weight(5)
            .order();
        let response = self.limiter.submit(spec).await?;
        let items: Vec<Value> = parse(&response)?;
        Ok(items
            .into_iter()
            .map(|item| {
                if let Ok(err) = serde_json::from_value::<ApiErrorBody>(item.clone()) {
                    Err(RestError::Exchange {
                        status: response.status,
                        code: err.code,
                        message: err.msg,
                    })
                } else {
                    serde_json::from_value::<OrderAck>(item)
                        .map_err(|e| RestError::Parse(e.to_string()))
                }
            })
            .collect())
    }

    /// `DELETE /fapi/v1/order`.
    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> RestResult<OrderAck> {
        let mut params = Params::new();
        params.push("symbol", symbol).push("orderId", order_id);
        let spec = RequestSpec::new(Method::DELETE, "/fapi/v1/order", Security::Signed)
            .params(params)
            .priority(Priority::Critical)
            .weight(1);
        self.fetch(spec).await
    }

    /// `DELETE /fapi/v1/allOpenOrders`.
    pub async fn cancel_all_orders(&self, symbol: &str) -> RestResult<()> {
        let mut params = Params::new();
        params.push("symbol", symbol);
        let spec = RequestSpec::new(Method::DELETE, "/fapi/v1/allOpenOrders", Security::Signed)
            .params(params)
            .priority(Priority::Critical)
            .weight(1);
        self.limiter.submit(spec).await.map(|_| ())
    }

    // --- Position state (HIGH) ---

    /// `GET /fapi/v2/positionRisk`.
    pub async fn position_risk(&self) -> RestResult<Vec<PositionRisk>> {
        let spec = RequestSpec::new(Method::GET, "/fapi/v2/positionRisk", Security::Signed)
            .priority(Priority::High)
            .weight(5)
            .dedup("GET:/fapi/v2/positionRisk");
        self.fetch(spec).await
    }

    /// `POST /fapi/v1/leverage`.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> RestResult<()> {
        let mut params = Params::new();
        params.push("symbol", symbol).push("leverage", leverage);
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/leverage", Security::Signed)
            .params(params)
            .priority(Priority::High)
            .weight(1);
        self.limiter.submit(spec).await.map(|_| ())
    }

    /// `GET /fapi/v1/positionSide/dual`. Returns the venue's
    /// `dualSidePosition` flag (true = hedge mode).
    pub async fn position_mode(&self) -> RestResult<bool> {
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/positionSide/dual", Security::Signed)
            .priority(Priority::High)
            .weight(1)
            .dedup("GET:/fapi/v1/positionSide/dual");
        let mode: PositionModeResponse = self.fetch(spec).await?;
        Ok(mode.dual_side_position)
    }

    /// `POST /fapi/v1/positionSide/dual`.
    pub async fn set_position_mode(&self, dual_side: bool) -> RestResult<()> {
        let mut params = Params::new();
        params.push("dualSidePosition", dual_side);
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/positionSide/dual", Security::Signed)
            .params(params)
            .priority(Priority::High)
            .weight(1);
        self.limiter.submit(spec).await.map(|_| ())
    }

    // --- Account reads (MEDIUM) ---

    /// `GET /fapi/v2/balance`.
    pub async fn balances(&self) -> RestResult<Vec<AccountBalance>> {
        let spec = RequestSpec::new(Method::GET, "/fapi/v2/balance", Security::Signed)
            .priority(Priority::Medium)
            .weight(5)
            .dedup("GET:/fapi/v2/balance");
        self.fetch(spec).await
    }

    /// `GET /fapi/v4/account`.
    pub async fn account(&self) -> RestResult<AccountInfo> {
        let spec = RequestSpec::new(Method::GET, "/fapi/v4/account", Security::Signed)
            .priority(Priority::Medium)
            .weight(5)
            .dedup("GET:/fapi/v4/account");
        self.fetch(spec).await
    }

    /// `GET /fapi/v1/openOrders`. Without a symbol the venue charges a
    /// heavier weight.
    pub async fn open_orders(&self, symbol: Option<&str>) -> RestResult<Vec<OpenOrder>> {
        let mut params = Params::new();
        params.push_opt("symbol", symbol);
        let weight = if symbol.is_some() { 1 } else { 5 };
        let dedup = match symbol {
            Some(s) => format!("GET:/fapi/v1/openOrders:{s}"),
            None => "GET:/fapi/v1/openOrders".to_string(),
        };
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/openOrders", Security::Signed)
            .params(params)
            .priority(Priority::Medium)
            .weight(weight)
            .dedup(dedup);
        self.fetch(spec).await
    }

    // --- Market data (LOW) ---

    /// `GET /fapi/v1/ticker/bookTicker`.
    pub async fn book_ticker(&self, symbol: &str) -> RestResult<BookTicker> {
        let mut params = Params::new();
        params.push("symbol", symbol);
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/ticker/bookTicker", Security::Public)
            .params(params)
            .priority(Priority::Low)
            .weight(1)
            .dedup(format!("GET:/fapi/v1/ticker/bookTicker:{symbol}"));
        self.fetch(spec).await
    }

    /// `GET /fapi/v1/klines`. The venue serializes klines as positional
    /// arrays; only the OHLCV prefix is retained.
    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> RestResult<Vec<Kline>> {
        let mut params = Params::new();
        params
            .push("symbol", symbol)
            .push("interval", interval)
            .push("limit", limit);
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/klines", Security::Public)
            .params(params)
            .priority(Priority::Low)
            .weight(2)
            .dedup(format!("GET:/fapi/v1/klines:{symbol}:{interval}:{limit}"));
        let response = self.limiter.submit(spec).await?;
        let rows: Vec<Vec<Value>> = parse(&response)?;
        rows.into_iter().map(|row| parse_kline(&row)).collect()
    }

    /// `GET /fapi/v1/depth`.
    pub async fn depth(&self, symbol: &str, limit: u32) -> RestResult<DepthSnapshot> {
        let mut params = Params::new();
        params.push("symbol", symbol).push("limit", limit);
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/depth", Security::Public)
            .params(params)
            .priority(Priority::Low)
            .weight(2)
            .dedup(format!("GET:/fapi/v1/depth:{symbol}:{limit}"));
        self.fetch(spec).await
    }

    /// `GET /fapi/v1/exchangeInfo`.
    pub async fn exchange_info(&self) -> RestResult<ExchangeInfo> {
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/exchangeInfo", Security::Public)
            .priority(Priority::Low)
            .weight(1)
            .dedup("GET:/fapi/v1/exchangeInfo");
        self.fetch(spec).await
    }

    // --- Listen key (user-data stream) ---

    /// `POST /fapi/v1/listenKey`.
    pub async fn create_listen_key(&self) -> RestResult<String> {
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/listenKey", Security::ApiKey)
            .priority(Priority::High)
            .weight(1);
        let key: ListenKeyResponse = self.fetch(spec).await?;
        Ok(key.listen_key)
    }

    /// `PUT /fapi/v1/listenKey`.
    pub async fn keepalive_listen_key(&self) -> RestResult<()> {
        let spec = RequestSpec::new(Method::PUT, "/fapi/v1/listenKey", Security::ApiKey)
            .priority(Priority::High)
            .weight(1);
        self.limiter.submit(spec).await.map(|_| ())
    }

    /// `DELETE /fapi/v1/listenKey`.
    pub async fn close_listen_key(&self) -> RestResult<()> {
        let spec = RequestSpec::new(Method::DELETE, "/fapi/v1/listenKey", Security::ApiKey)
            .priority(Priority::High)
            .weight(1);
        self.limiter.submit(spec).await.map(|_| ())
    }
}

fn parse<T: DeserializeOwned>(response: &RawResponse) -> RestResult<T> {
    serde_json::from_str(&response.body).map_err(|e| RestError::Parse(e.to_string()))
}

fn parse_kline(row: &[Value]) -> RestResult<Kline> {
    fn decimal(value: Option<&Value>) -> RestResult<rust_decimal::Decimal> {
        match value {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|e| RestError::Parse(format!("bad kline number: {e}"))),
            Some(Value::Number(n)) => n
                .to_string()
                .parse()
                .map_err(|e| RestError::Parse(format!("bad kline number: {e}"))),
            other => Err(RestError::Parse(format!("bad kline field: {other:?}"))),
        }
    }

    let open_time_ms = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| RestError::Parse("kline missing open time".to_string()))?;
    Ok(Kline {
        open_time_ms,
        open: decimal(row.get(1))?,
        high: decimal(row.get(2))?,
        low: decimal(row.get(3))?,
        close: decimal(row.get(4))?,
        volume: decimal(row.get(5))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_params_layout() {
        let order = NewOrder::new("BTCUSDT", Side::Buy, OrderType::Limit)
            .qty(Qty::new(dec!(0.001)))
            .price(Price::new(dec!(49975)))
            .time_in_force(TimeInForce::Gtc);
        let query = order.params().serialize();
        assert!(query.starts_with(
            "symbol=BTCUSDT&side=BUY&positionSide=BOTH&type=LIMIT&quantity=0.001&price=49975&timeInForce=GTC"
        ));
        assert!(query.contains("newClientOrderId=liq_"));
        assert!(!query.contains("reduceOnly"));
    }

    #[test]
    fn test_protective_order_params() {
        let order = NewOrder::new("BTCUSDT", Side::Sell, OrderType::StopMarket)
            .qty(Qty::new(dec!(0.001)))
            .stop_price(Price::new(dec!(48975.5)))
            .reduce_only(true)
            .mark_price_trigger();
        let query = order.params().serialize();
        assert!(query.contains("type=STOP_MARKET"));
        assert!(query.contains("stopPrice=48975.5"));
        assert!(query.contains("reduceOnly=true"));
        assert!(query.contains("workingType=MARK_PRICE"));
        assert!(query.contains("priceProtect=TRUE"));
    }

    #[test]
    fn test_kline_row_parsing() {
        let row: Vec<Value> = serde_json::from_str(
            r#"[1700000000000, "50000.0", "50100.0", "49900.0", "50050.0", "12.5", 1700000059999, "625625.0", 100, "6.0", "300300.0", "0"]"#,
        )
        .unwrap();
        let kline = parse_kline(&row).unwrap();
        assert_eq!(kline.open_time_ms, 1_700_000_000_000);
        assert_eq!(kline.close, dec!(50050.0));
        assert_eq!(kline.volume, dec!(12.5));
    }
}
