use std::net::{SocketAddr, TcpListener};
use std::str::FromStr;
use std::time::Duration;

use sqlx::any::AnyConnectOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::Filter;

use crate::store::{CredentialStore, PoolConfig};

pub const ARTISTS: &str = r#"[{"id":1,"name":"Queen","members":["Freddie Mercury"]}]"#;
pub const LOCATIONS: &str = r#"{"index":[{"id":1,"locations":["london-uk"],"dates":""}]}"#;
pub const DATES_GONE: &str = "gone";

/// A store backed by a fresh sqlite file, so pooled connections share one database.
pub async fn create_store() -> CredentialStore {
    let path = std::env::temp_dir().join(format!("groupie-relay-{}.db", Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let options = AnyConnectOptions::from_str(&url).unwrap();

    CredentialStore::connect(options, &PoolConfig::default())
        .await
        .unwrap()
}

pub async fn count_users(store: &CredentialStore) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `user`")
        .fetch_one(store.pool())
        .await
        .unwrap();

    count
}

/// Large enough to span many chunks.
pub fn relation_body() -> String {
    let entries: Vec<String> = (0..20_000)
        .map(|id| format!(r#"{{"id":{id},"datesLocations":{{"london-uk":["01-01-2020"]}}}}"#))
        .collect();

    format!(r#"{{"index":[{}]}}"#, entries.join(","))
}

/// Serves a fake Groupie Trackers API under `/api` on an ephemeral port.
pub async fn upstream() -> SocketAddr {
    let artists = warp::path!("api" / "artists")
        .map(|| warp::reply::with_header(ARTISTS, "content-type", "application/json"));

    // no content-type at all
    let locations =
        warp::path!("api" / "locations").map(|| Response::new(Body::from(LOCATIONS)));

    let dates = warp::path!("api" / "dates")
        .map(|| warp::reply::with_status(DATES_GONE, StatusCode::NOT_FOUND));

    let relation = warp::path!("api" / "relation")
        .map(|| warp::reply::with_header(relation_body(), "content-type", "application/json"));

    let slow = warp::path!("api" / "slow").then(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    });

    let routes = warp::get().and(artists.or(locations).or(dates).or(relation).or(slow));

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    addr
}

/// Answers one request with headers promising more body than it sends, then hangs up.
pub async fn truncating_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = [0; 1024];
        let _ = socket.read(&mut request).await;

        let response = "HTTP/1.1 200 OK\r\n\
            content-type: application/json\r\n\
            content-length: 100\r\n\
            \r\n\
            [{\"id\":1";
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    addr
}

/// An address nothing listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
