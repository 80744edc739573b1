use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use log::{error, info, warn};
use warp::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;

use crate::routes::RouteTable;
use crate::server::json_error;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// No route for the local path.
    NotFound,
    /// Upstream refused, timed out or otherwise failed before answering.
    Unavailable,
}

impl RelayError {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unavailable => "upstream_unavailable",
        }
    }
}

impl From<RelayError> for StatusCode {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::Unavailable => StatusCode::BAD_GATEWAY,
        }
    }
}

/// An upstream answer whose body has not been read yet.
///
/// The body stream owns the upstream response: dropping it (after a full copy,
/// a failed copy or a client disconnect) releases the upstream connection.
pub struct Relayed {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

pub struct ProxyRelay {
    client: reqwest::Client,
    routes: RouteTable,
}

impl ProxyRelay {
    /// `timeout` bounds each upstream exchange, body included.
    pub fn new(routes: RouteTable, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, routes })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn relay_path(&self, local_path: &str) -> Result<Relayed, RelayError> {
        let route = self.routes.find(local_path).ok_or_else(|| {
            warn!("no upstream for {local_path}");
            RelayError::NotFound
        })?;

        self.relay(&route.upstream_url).await
    }

    pub async fn relay(&self, upstream_url: &str) -> Result<Relayed, RelayError> {
        info!("relaying to {upstream_url}");

        let response = self.client.get(upstream_url).send().await.map_err(|e| {
            error!("fetching {upstream_url}: {e}");
            RelayError::Unavailable
        })?;

        let status = StatusCode::from_u16(response.status().as_u16()).map_err(|e| {
            error!("{upstream_url} answered an unusable status: {e}");
            RelayError::Unavailable
        })?;

        if !status.is_success() {
            warn!("{upstream_url} answered {status}, passing it through");
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .filter(|ct| !ct.is_empty())
            .and_then(|ct| HeaderValue::from_bytes(ct.as_bytes()).ok())
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        let url = upstream_url.to_owned();
        let body = response
            .bytes_stream()
            // headers are committed by now, all we can do is note the truncation
            .inspect_err(move |e| error!("copying body from {url}: {e}"))
            .boxed();

        Ok(Relayed {
            status,
            content_type,
            body,
        })
    }
}

impl Relayed {
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::wrap_stream(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(CONTENT_TYPE, self.content_type);
        response
    }
}

/// Turns a relay outcome into a reply. Every relay reply, failed or not, may be
/// read cross-origin.
pub fn respond(outcome: Result<Relayed, RelayError>) -> Response {
    let mut response = match outcome {
        Ok(relayed) => relayed.into_response(),
        Err(e) => json_error(e.into(), e.code()),
    };

    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
