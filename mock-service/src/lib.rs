//! A stand-in for the geospatial query API, used to exercise the load harness.
use axum::{
    body::Bytes,
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

const DEFAULT_TOP_K: u32 = 5;
const MAX_TOP_K: u32 = 50;

/// Behaviour of the mock: latency, injected failures and capacity.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    delay: Duration,
    jitter: Duration,
    error_every: u64,
    max_tps: Option<NonZeroU32>,
}

impl MockConfig {
    /// Fixed delay before every response.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Extra uniform random delay in `[0, jitter]`.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Every `n`-th request gets a 500. Zero disables.
    pub fn error_every(mut self, n: u64) -> Self {
        self.error_every = n;
        self
    }

    /// Requests beyond `tps` per second get a 503. Zero disables.
    pub fn max_tps(mut self, tps: u32) -> Self {
        self.max_tps = NonZeroU32::new(tps);
        self
    }
}

#[derive(Clone)]
struct AppState {
    config: MockConfig,
    requests: Arc<AtomicU64>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

pub fn router(config: MockConfig) -> Router {
    let state = AppState {
        limiter: config.max_tps.map(|tps| Arc::new(rate_limiter(tps))),
        config,
        requests: Arc::new(AtomicU64::new(0)),
    };

    Router::new()
        .route("/api/autocomplete", get(autocomplete).post(autocomplete))
        .route("/api/reverse", get(reverse).post(reverse))
        .route("/api/search", get(search).post(search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config)).await?;
    Ok(())
}

/// Serve on an ephemeral local port in the background.
pub async fn spawn(config: MockConfig) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(config)).await {
            tracing::error!("Mock service failed: {err}");
        }
    });
    Ok(addr)
}

/** Handlers **/

#[derive(Debug, Default, Deserialize)]
struct Params {
    query: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    top_k: Option<u32>,
}

impl Params {
    /// Query-string values, overridden by any present in the JSON body.
    fn merge(self, body: Params) -> Params {
        Params {
            query: body.query.or(self.query),
            lat: body.lat.or(self.lat),
            lon: body.lon.or(self.lon),
            top_k: body.top_k.or(self.top_k),
        }
    }

    fn query(&self) -> Result<&str, ApiError> {
        match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => Ok(query),
            _ => Err(ApiError::missing("query")),
        }
    }

    fn point(&self) -> Result<Option<(f64, f64)>, ApiError> {
        match (self.lat, self.lon) {
            (None, None) => Ok(None),
            (Some(lat), Some(lon))
                if (-90. ..=90.).contains(&lat) && (-180. ..=180.).contains(&lon) =>
            {
                Ok(Some((lat, lon)))
            }
            (Some(_), Some(_)) => Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_coordinates",
                "lat must be within [-90, 90] and lon within [-180, 180]",
            )),
            (None, Some(_)) => Err(ApiError::missing("lat")),
            (Some(_), None) => Err(ApiError::missing("lon")),
        }
    }

    fn top_k(&self) -> u32 {
        self.top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K)
    }
}

#[derive(Debug, Serialize)]
struct Place {
    name: String,
    lat: f64,
    lon: f64,
    score: f64,
}

#[debug_handler]
async fn autocomplete(
    State(state): State<AppState>,
    query: Option<Query<Params>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = admit(&state, "autocomplete", query, &body).await?;
    let query = params.query()?;
    let point = params.point()?;

    let results = places(query, point, params.top_k());
    Ok(Json(json!({ "query": query, "results": results })).into_response())
}

#[debug_handler]
async fn reverse(
    State(state): State<AppState>,
    query: Option<Query<Params>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = admit(&state, "reverse", query, &body).await?;
    let Some((lat, lon)) = params.point()? else {
        return Err(ApiError::missing("lat"));
    };

    let place = Place {
        name: format!("Place near {lat:.4},{lon:.4}"),
        lat,
        lon,
        score: 1.,
    };
    Ok(Json(json!({ "results": [place] })).into_response())
}

#[debug_handler]
async fn search(
    State(state): State<AppState>,
    query: Option<Query<Params>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = admit(&state, "search", query, &body).await?;
    let query = params.query()?;
    let point = params.point()?;

    let results = places(query, point, params.top_k());
    Ok(Json(json!({ "query": query, "top_k": params.top_k(), "results": results })).into_response())
}

/// Shared request path: counting, capacity, delay, failure injection and
/// parameter extraction, in that order.
async fn admit(
    state: &AppState,
    endpoint: &'static str,
    query: Option<Query<Params>>,
    body: &[u8],
) -> Result<Params, ApiError> {
    let n = state.requests.fetch_add(1, Ordering::Relaxed) + 1;
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    counter!("mock_service_requests_total", "endpoint" => endpoint).increment(1);

    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            debug!("Over capacity, rejecting request {n}");
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "over_capacity",
                "service is over capacity",
            ));
        }
    }

    let mut delay = state.config.delay;
    if !state.config.jitter.is_zero() {
        delay += rand::thread_rng().gen_range(Duration::ZERO..=state.config.jitter);
    }
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.config.error_every > 0 && n % state.config.error_every == 0 {
        debug!("Injecting failure for request {n}");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "injected_failure",
            "injected failure",
        ));
    }

    let query = query.map(|Query(params)| params).unwrap_or_default();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(query);
    }
    let body: Params = serde_json::from_slice(body).map_err(|err| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_body", &err.to_string())
    })?;
    Ok(query.merge(body))
}

fn places(query: &str, point: Option<(f64, f64)>, top_k: u32) -> Vec<Place> {
    let (lat, lon) = point.unwrap_or((-6.1754, 106.8272));
    (0..top_k)
        .map(|i| Place {
            name: if i == 0 {
                query.to_string()
            } else {
                format!("{query} {i}")
            },
            lat: lat + i as f64 * 1e-3,
            lon: lon + i as f64 * 1e-3,
            score: 1. / (i + 1) as f64,
        })
        .collect()
}

/** Errors **/

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: &str) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "missing_field",
            &format!("missing required field `{field}`"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

/** Utils **/

pub fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps))
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        gauge!("mock_service_tps").set(transactions as f64);
        tracing::info!("{transactions} TPS");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn get(url: String) -> (u16, Value) {
        let res = reqwest::get(url).await.unwrap();
        (res.status().as_u16(), res.json().await.unwrap())
    }

    async fn post(url: String, body: Value) -> (u16, Value) {
        let res = reqwest::Client::new()
            .post(url)
            .json(&body)
            .send()
            .await
            .unwrap();
        (res.status().as_u16(), res.json().await.unwrap())
    }

    #[tokio::test]
    async fn serves_all_endpoints() {
        let addr = spawn(MockConfig::default()).await.unwrap();

        let (status, body) =
            post(format!("http://{addr}/api/autocomplete"), json!({ "query": "Taman" })).await;
        assert_eq!(status, 200);
        assert_eq!(body["results"][0]["name"], "Taman");

        let (status, body) = get(format!("http://{addr}/api/reverse?lat=-6.2&lon=106.8")).await;
        assert_eq!(status, 200);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);

        let (status, body) = post(
            format!("http://{addr}/api/search"),
            json!({ "query": "Monas", "top_k": 3, "lat": -6.17, "lon": 106.82 }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let addr = spawn(MockConfig::default()).await.unwrap();

        let (status, body) = post(format!("http://{addr}/api/autocomplete"), json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "missing_field");

        let (status, body) = get(format!("http://{addr}/api/reverse?lat=-6.2")).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "missing_field");
    }

    #[tokio::test]
    async fn injects_every_nth_failure() {
        let addr = spawn(MockConfig::default().error_every(3)).await.unwrap();
        let mut statuses = vec![];
        for _ in 0..6 {
            let (status, _) = get(format!("http://{addr}/api/search?query=Kota")).await;
            statuses.push(status);
        }
        assert_eq!(statuses, [200, 200, 500, 200, 200, 500]);
    }

    #[tokio::test]
    async fn over_capacity_is_503() {
        let addr = spawn(MockConfig::default().max_tps(1)).await.unwrap();
        let (first, _) = get(format!("http://{addr}/api/search?query=Kota")).await;
        let (second, body) = get(format!("http://{addr}/api/search?query=Kota")).await;
        assert_eq!(first, 200);
        assert_eq!(second, 503);
        assert_eq!(body["error"]["code"], "over_capacity");
    }
}
