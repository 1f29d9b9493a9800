use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};

use crate::error::ApiError;

pub const API_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";
pub const AUTH_LIMIT_MESSAGE: &str = "Too many authentication attempts, please try again later.";

/// Request budget per client IP: `max_requests` per `window`, refilled
/// continuously rather than reset at window boundaries.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    clock: DefaultClock,
    message: &'static str,
}

impl RateLimit {
    /// `None` when either bound is zero.
    pub fn per_window(max_requests: u32, window: Duration, message: &'static str) -> Option<Self> {
        let burst = NonZeroU32::new(max_requests)?;
        let quota = Quota::with_period(window / max_requests)?.allow_burst(burst);

        Some(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            clock: DefaultClock::default(),
            message,
        })
    }

    /// Take one request from `client`'s budget. `Err` holds the wait until
    /// the next request would be admitted.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.limiter
            .check_key(&client)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn rate_limit(State(limit): State<RateLimit>, request: Request, next: Next) -> Result<Response, ApiError> {
    let client = client_ip(&request);

    if let Err(wait) = limit.check(client) {
        let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        tracing::warn!(ip = %client, path = %request.uri().path(), "Rate limit exceeded");
        return Err(ApiError::too_many_requests(limit.message, retry_after.max(1)));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_per_client() {
        let limit = RateLimit::per_window(2, Duration::from_secs(60), API_LIMIT_MESSAGE).unwrap();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limit.check(a).is_ok());
        assert!(limit.check(a).is_ok());
        let wait = limit.check(a).unwrap_err();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(30));

        assert!(limit.check(b).is_ok());
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(RateLimit::per_window(0, Duration::from_secs(60), API_LIMIT_MESSAGE).is_none());
        assert!(RateLimit::per_window(5, Duration::ZERO, API_LIMIT_MESSAGE).is_none());
    }
}
