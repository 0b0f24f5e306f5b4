use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use futures_util::Stream;
use std::convert::Infallible;

use crate::engine::RelayEvent;
use crate::error::AnalysisError;

pub fn build_sse_response<S>(frames: S) -> Response<Body>
where
    S: Stream<Item = Result<String, Infallible>> + Send + 'static,
{
    let mut response = Response::new(Body::from_stream(frames));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response.headers_mut().insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// A stream that failed before any provider was contacted: one error event,
/// then the terminator.
pub(super) fn fatal_sse_response(error: &AnalysisError) -> Response<Body> {
    let frames = [
        RelayEvent::error(error.kind(), error.to_string()).to_sse(),
        RelayEvent::Done.to_sse(),
    ];
    build_sse_response(futures_util::stream::iter(frames.map(Ok)))
}
