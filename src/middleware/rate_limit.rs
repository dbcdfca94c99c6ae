use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, header::HeaderValue},
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter as GovRateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::{future::Future, net::SocketAddr, num::NonZeroU32, pin::Pin, sync::Arc};

use crate::config::env_or;

/// Keyed by client IP
pub type RateLimiter = GovRateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub type KeyedRateLimiter = Arc<RateLimiter>;

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    /// Requests per window across the whole REST surface
    pub general_max: u32,
    /// Requests per window on register/login
    pub auth_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            general_max: 300,
            auth_max: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            window_secs: env_or("RATE_LIMIT_WINDOW", defaults.window_secs)?,
            general_max: env_or("RATE_LIMIT_MAX", defaults.general_max)?,
            auth_max: env_or("AUTH_RATE_LIMIT_MAX", defaults.auth_max)?,
        })
    }
}

/// Create a limiter allowing `max_requests` per configured window
pub fn create_rate_limiter(config: &RateLimitConfig, max_requests: u32) -> KeyedRateLimiter {
    let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
    let period = std::time::Duration::from_secs(config.window_secs.max(1)) / burst.get();
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    Arc::new(GovRateLimiter::keyed(quota))
}

pub fn general_rate_limiter(config: &RateLimitConfig) -> KeyedRateLimiter {
    create_rate_limiter(config, config.general_max)
}

pub fn auth_rate_limiter(config: &RateLimitConfig) -> KeyedRateLimiter {
    create_rate_limiter(config, config.auth_max)
}

/// Client IP from proxy headers, then the socket peer address
pub fn extract_client_ip<B>(req: &Request<B>) -> String {
    let headers = req.headers();

    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value(value: impl ToString, fallback: &'static str) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static(fallback))
}

pub fn rate_limit_headers(limit: u32, retry_after: Option<u64>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-RateLimit-Limit", header_value(limit, "0"));
    if let Some(retry) = retry_after {
        headers.insert("Retry-After", header_value(retry, "1"));
    }
    headers
}

pub fn rate_limit_exceeded_response(limit: u32, retry_after: u64) -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": "Too many requests. Please try again later.",
        "retryAfter": retry_after
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        rate_limit_headers(limit, Some(retry_after)),
        axum::Json(body),
    )
        .into_response()
}

/// Tower layer applying one keyed limiter to every request it wraps
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: KeyedRateLimiter,
    limit: u32,
}

impl RateLimitMiddleware {
    pub fn new(limiter: KeyedRateLimiter, limit: u32) -> Self {
        Self { limiter, limit }
    }
}

impl<S> tower::Layer<S> for RateLimitMiddleware {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: KeyedRateLimiter,
    limit: u32,
}

impl<S, B> tower::Service<Request<B>> for RateLimitService<S>
where
    S: tower::Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let mut inner = self.inner.clone();
        let limiter = self.limiter.clone();
        let limit = self.limit;

        Box::pin(async move {
            let client_ip = extract_client_ip(&req);

            match limiter.check_key(&client_ip) {
                Ok(()) => {
                    let mut response = inner.call(req).await?;
                    response
                        .headers_mut()
                        .extend(rate_limit_headers(limit, None));
                    Ok(response)
                }
                Err(not_until) => {
                    let wait = not_until.wait_time_from(DefaultClock::default().now());
                    tracing::warn!("Rate limit exceeded for {}", client_ip);
                    Ok(rate_limit_exceeded_response(limit, wait.as_secs().max(1)))
                }
            }
        })
    }
}
