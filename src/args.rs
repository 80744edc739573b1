use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use sqlx::any::AnyConnectOptions;
use sqlx::mysql::MySqlConnectOptions;

use crate::pages::Pages;
use crate::store::PoolConfig;

/// Every option can also be given through the environment variable shown in `--help`.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The address to listen on.
    #[arg(short, long, env = "ADDRESS", default_value = "0.0.0.0")]
    address: String,

    /// The port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// `1` runs without the credential store: registration and login
    /// answer 503, everything else is served as usual.
    #[arg(long, env = "DISABLE_DB")]
    disable_db: Option<String>,

    /// Full store URL (`mysql://...` or `sqlite://...`), overriding the `db-*` options.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "root")]
    db_user: String,

    #[arg(long, env = "DB_PASS", default_value = "", hide_env_values = true)]
    db_pass: String,

    #[arg(long, env = "DB_NAME", default_value = "groupi_tracker")]
    db_name: String,

    /// Bound on each store round-trip.
    #[arg(long, env = "DB_TIMEOUT_SECS", default_value_t = 5)]
    db_timeout_secs: u64,

    /// Base URL of the relayed API.
    #[arg(
        long,
        env = "GROUPIE_TRACKERS_API",
        default_value = "https://groupietrackers.herokuapp.com/api"
    )]
    upstream_base: String,

    /// Bound on each relayed exchange, body included.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    upstream_timeout_secs: u64,

    /// bcrypt work factor for new passwords.
    #[arg(
        long,
        env = "BCRYPT_COST",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(4..=31)
    )]
    bcrypt_cost: u32,

    #[arg(long, env = "STATIC_DIR", default_value = "web/static")]
    static_dir: PathBuf,

    #[arg(long, env = "TEMPLATES_DIR", default_value = "web/templates")]
    templates_dir: PathBuf,

    #[arg(long, env = "INDEX_PAGE", default_value = "index.html")]
    index: PathBuf,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn db_disabled(&self) -> bool {
        self.disable_db.as_deref() == Some("1")
    }

    pub fn connect_options(&self) -> Result<AnyConnectOptions, sqlx::Error> {
        match &self.database_url {
            Some(url) => AnyConnectOptions::from_str(url),
            None => Ok(MySqlConnectOptions::new()
                .host(&self.db_host)
                .port(self.db_port)
                .username(&self.db_user)
                .password(&self.db_pass)
                .database(&self.db_name)
                .charset("utf8mb4")
                .into()),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            timeout: Duration::from_secs(self.db_timeout_secs),
            ..PoolConfig::default()
        }
    }

    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub fn pages(&self) -> Pages {
        Pages {
            static_dir: self.static_dir.clone(),
            templates_dir: self.templates_dir.clone(),
            index: self.index.clone(),
        }
    }
}
