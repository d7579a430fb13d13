// Trace-ID propagation. Every request gets a trace id - either carried over
// from an upstream `X-Trace-ID` header, or minted here - which flows into
// the audit log, error envelopes and the response header so a client report
// can be correlated back to a specific request end to end.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

pub static TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

#[derive(Debug, Clone)]
pub struct TraceId(pub String);

tokio::task_local! {
    /// The current request's trace id, available for the lifetime of the
    /// future `trace_middleware` drives through `next.run`. This lets
    /// `AppError`'s default `IntoResponse` impl pick up the propagated id
    /// without every handler needing to extract and thread `TraceId`
    /// through explicitly.
    pub static CURRENT_TRACE_ID: String;
}

pub async fn trace_middleware(mut request: Request<Body>, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(&TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = CURRENT_TRACE_ID
        .scope(trace_id.clone(), next.run(request))
        .await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER.clone(), value);
    }
    response
}

impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<TraceId>()
            .cloned()
            .unwrap_or_else(|| TraceId(uuid::Uuid::new_v4().to_string())))
    }
}
