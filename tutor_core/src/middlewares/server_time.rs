use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::warn;

use super::SERVER_TIME_HEADER;

/// Report how long the handler stack took, in microseconds.
pub async fn set_server_time(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut resp = next.run(req).await;
    let elapsed = format!("{}us", start.elapsed().as_micros());
    match HeaderValue::from_str(&elapsed) {
        Ok(v) => {
            resp.headers_mut().insert(SERVER_TIME_HEADER, v);
        }
        Err(e) => warn!("invalid server time header {}: {}", elapsed, e),
    }
    resp
}
