//! HTTP surface of the relay
//!
//! One method-agnostic route at `/`. Everything else is a 404.

use actix_web::http::header::{self, ContentType, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, error};

use crate::cache::{Outcome, RefreshCache};
use crate::data::FeedError;

/// Body of every response to an unknown path
pub const NOT_FOUND_BODY: &str = "NOT FOUND";

/// Indent used for response bodies
const BODY_INDENT: &[u8] = b"   ";

/// Answers a request with the cached FeatureCollection
///
/// Registered as the app's default service so that it sees every method and
/// path. A fresh cache answers at once; a stale one is refreshed and the
/// request waits for the new collection.
pub async fn relay(req: HttpRequest, cache: web::Data<RefreshCache>) -> HttpResponse {
    if req.path() != "/" {
        debug!(method = %req.method(), path = req.path(), "unknown route");
        return HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body(NOT_FOUND_BODY);
    }

    let allow_origin = allow_origin(&req);

    let value = match cache.handle_request(Utc::now().timestamp_millis()) {
        Outcome::Cached(value) => value,
        Outcome::Refreshing(task) => match task.wait().await {
            Ok(collection) => Some(collection),
            Err(err) => return upstream_error(&err, allow_origin),
        },
    };

    match render_pretty(&value.as_deref()) {
        Ok(body) => HttpResponse::Ok()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin))
            .content_type(ContentType::json())
            .body(body),
        Err(err) => {
            error!(error = %err, "failed to serialize station feed");
            HttpResponse::InternalServerError()
                .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin))
                .content_type(ContentType::plaintext())
                .body("could not serialize station feed")
        }
    }
}

/// Echoes the request's `Origin`, or `*` when there is none
fn allow_origin(req: &HttpRequest) -> HeaderValue {
    req.headers()
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"))
}

/// 504 when the upstream timed out, 502 for every other fetch failure
fn upstream_error(err: &FeedError, allow_origin: HeaderValue) -> HttpResponse {
    let mut response = if err.is_timeout() {
        HttpResponse::GatewayTimeout()
    } else {
        HttpResponse::BadGateway()
    };

    response
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin))
        .content_type(ContentType::plaintext())
        .body(format!("could not fetch station feed: {}", err))
}

/// Serializes `value` as JSON indented with three spaces
pub fn render_pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut body = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(BODY_INDENT));
    value.serialize(&mut serializer)?;
    Ok(body)
}
