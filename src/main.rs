use std::env;
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

mod args;
mod auth;
mod pages;
mod relay;
mod routes;
mod server;
mod store;
mod user;

#[cfg(test)]
mod mock;

use args::Args;
use auth::AuthService;
use relay::ProxyRelay;
use routes::RouteTable;
use store::CredentialStore;

#[tokio::main]
async fn main() {
    init_logging();

    let args = Args::parse();

    let store = connect_store(&args).await;
    let auth = match AuthService::new(store, args.bcrypt_cost()) {
        Ok(auth) => auth,
        Err(e) => {
            error!("couldn't set up password hashing: {e:?}");
            process::exit(1);
        }
    };
    if !auth.has_store() {
        warn!("running without a credential store, /api/register and /api/login will answer 503");
    }

    let table = RouteTable::groupie(args.upstream_base());
    let relay = match ProxyRelay::new(table, args.upstream_timeout()) {
        Ok(relay) => relay,
        Err(e) => {
            error!("couldn't build the upstream client: {e}");
            process::exit(1);
        }
    };
    for route in relay.routes().iter() {
        info!("relaying {} to {}", route.local_path, route.upstream_url);
    }

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid listen address: {e}");
            process::exit(1);
        }
    };

    let routes = server::routes(Arc::new(relay), Arc::new(auth), &args.pages());

    let (addr, server) = match warp::serve(routes).try_bind_ephemeral(addr) {
        Ok(bound) => bound,
        Err(e) => {
            error!("couldn't listen on {addr}: {e}");
            process::exit(1);
        }
    };

    info!("listening on http://{addr}/");
    server.await
}

fn init_logging() {
    let filters = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();
}

/// A store that can't be reached leaves the server up, without accounts.
async fn connect_store(args: &Args) -> Option<CredentialStore> {
    if args.db_disabled() {
        info!("store disabled via DISABLE_DB=1");
        return None;
    }

    let options = match args.connect_options() {
        Ok(options) => options,
        Err(e) => {
            warn!("store disabled, bad connection settings: {e}");
            return None;
        }
    };

    match CredentialStore::connect(options, &args.pool_config()).await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("store disabled, init failed: {e:?}");
            None
        }
    }
}
