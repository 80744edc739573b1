use std::convert::Infallible;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use log::warn;
use serde::Serialize;
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::AuthService;
use crate::pages::{self, Pages};
use crate::relay::{self, ProxyRelay};

/// Largest accepted auth payload.
pub const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyError {
    TooLarge,
    Unreadable,
}

impl BodyError {
    fn into_response(self) -> Response {
        match self {
            Self::TooLarge => json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Unreadable => json_error(StatusCode::BAD_REQUEST, "invalid_payload"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// `{"error": code}` with the given status. The only error shape clients see.
pub fn json_error(status: StatusCode, code: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error: code }), status).into_response()
}

/// The whole server: auth and relay under `/api`, pages everywhere else.
pub fn routes(
    relay: Arc<ProxyRelay>,
    auth: Arc<AuthService>,
    pages: &Pages,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    api(relay, auth)
        .or(pages::routes(pages))
        .recover(handle_rejection)
        .with(warp::log("groupie_relay"))
}

fn api(
    relay: Arc<ProxyRelay>,
    auth: Arc<AuthService>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    // any method: the auth service answers non-POSTs itself
    let register = warp::path!("api" / "register")
        .and(warp::method())
        .and(bounded_body())
        .and(with(Arc::clone(&auth)))
        .then(register);

    let login = warp::path!("api" / "login")
        .and(warp::method())
        .and(bounded_body())
        .and(with(auth))
        .then(login);

    // everything else under /api is looked up in the route table
    let proxy = warp::path("api")
        .and(warp::path::full())
        .and(with(relay))
        .then(proxy);

    register.or(login).unify().or(proxy).unify()
}

// answered by the handlers rather than rejected, so an oversized body
// can't fall through to the relay catch-all
fn bounded_body() -> impl Filter<Extract = (Result<Bytes, BodyError>,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and(warp::body::stream())
        .then(|declared, body| read_bounded(declared, body, MAX_BODY_BYTES))
}

/// Collects at most `limit` bytes. A declared length over the limit is refused
/// unread, a body without one stops being read once it crosses the limit.
async fn read_bounded<S, B>(declared: Option<u64>, body: S, limit: u64) -> Result<Bytes, BodyError>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    if let Some(len) = declared.filter(|&len| len > limit) {
        warn!("refusing a {len} byte body");
        return Err(BodyError::TooLarge);
    }

    let mut body = Box::pin(body);
    let mut collected = BytesMut::new();

    while let Some(chunk) = body.try_next().await.map_err(|e| {
        warn!("reading request body: {e}");
        BodyError::Unreadable
    })? {
        if (collected.len() + chunk.remaining()) as u64 > limit {
            warn!("body grew past {limit} bytes, giving up");
            return Err(BodyError::TooLarge);
        }
        collected.put(chunk);
    }

    Ok(collected.freeze())
}

fn with<T: Clone + Send>(t: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || t.clone())
}

async fn register(
    method: Method,
    body: Result<Bytes, BodyError>,
    auth: Arc<AuthService>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    match auth.register(&method, &body).await {
        Ok(registered) => {
            warp::reply::with_status(warp::reply::json(&registered), StatusCode::CREATED)
                .into_response()
        }
        Err(e) => json_error(e.into(), e.code()),
    }
}

async fn login(
    method: Method,
    body: Result<Bytes, BodyError>,
    auth: Arc<AuthService>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    match auth.login(&method, &body).await {
        Ok(logged_in) => warp::reply::json(&logged_in).into_response(),
        Err(e) => json_error(e.into(), e.code()),
    }
}

async fn proxy(path: FullPath, relay: Arc<ProxyRelay>) -> Response {
    relay::respond(relay.relay_path(path.as_str()).await)
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, code) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
    } else {
        warn!("unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
    };

    Ok(json_error(status, code))
}
