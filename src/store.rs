use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use sqlx::any::{AnyConnectOptions, AnyKind, AnyPool, AnyPoolOptions};
use sqlx::error::DatabaseError;
use sqlx::migrate::Migrator;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{query, query_as, Connection};

use crate::user::{NewUser, StoredUser};

static MYSQL_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/mysql");
static SQLITE_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/sqlite");

const ER_DUP_ENTRY: u16 = 1062;
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Conflict,
    Timeout,
    Internal,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub idle_connections: u32,
    pub max_lifetime: Duration,
    /// Bound on a single round-trip, including pool checkout.
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            idle_connections: 5,
            max_lifetime: Duration::from_secs(30 * 60),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Account storage. Cheap to clone, clones share the pool.
#[derive(Clone)]
pub struct CredentialStore {
    pool: AnyPool,
    timeout: Duration,
}

impl CredentialStore {
    /// Opens the pool, pings it and brings the schema up to date.
    pub async fn connect(options: AnyConnectOptions, config: &PoolConfig) -> Result<Self, StoreError> {
        let kind = options.kind();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.idle_connections.min(config.max_connections))
            .max_lifetime(config.max_lifetime)
            .acquire_timeout(config.timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("couldn't open {kind:?} pool: {e:?}");
                StoreError::Internal
            })?;

        let store = Self {
            pool,
            timeout: config.timeout,
        };

        store.ping().await?;
        store.migrate(kind).await?;

        info!(
            "store ready: {kind:?}, up to {} connections",
            config.max_connections
        );
        Ok(store)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        })
        .await
    }

    async fn migrate(&self, kind: AnyKind) -> Result<(), StoreError> {
        #[allow(unreachable_patterns)]
        let migrator = match kind {
            AnyKind::MySql => &MYSQL_MIGRATIONS,
            AnyKind::Sqlite => &SQLITE_MIGRATIONS,
            _ => {
                error!("no migrations for {kind:?}");
                return Err(StoreError::Internal);
            }
        };

        migrator.run(&self.pool).await.map_err(|e| {
            error!("migration: {e:?}");
            StoreError::Internal
        })
    }

    /// Runs one round-trip under the store timeout, folding driver errors into `StoreError`.
    async fn bounded<T, F>(&self, what: &str, round_trip: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(Ok(r)) => Ok(r),
            Ok(Err(e)) => Err(classify(what, e)),
            Err(_elapsed) => {
                warn!("{what}: no answer within {:?}", self.timeout);
                Err(StoreError::Timeout)
            }
        }
    }
}

impl CredentialStore {
    pub async fn create_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        let result = self
            .bounded(
                "create user",
                query(
                    "
                    INSERT INTO `user`
                    (nom, prenom, sexe, password)
                    VALUES
                    (?, ?, ?, ?)
                    ",
                )
                .bind(user.profile.last_name.as_str())
                .bind(user.profile.first_name.as_str())
                .bind(user.profile.sex.as_str())
                .bind(user.password_hash.as_str())
                .execute(&self.pool),
            )
            .await?;

        result.last_insert_id().ok_or_else(|| {
            error!("create user: store returned no id");
            StoreError::Internal
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<StoredUser, StoreError> {
        self.bounded(
            "find user",
            query_as::<_, StoredUser>(
                "
                SELECT password, nom, prenom, sexe
                FROM `user`
                WHERE id_user = ?
                ",
            )
            .bind(id)
            .fetch_one(&self.pool),
        )
        .await
    }

    #[cfg(test)]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn classify(what: &str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => {
            debug!("{what}: no such row");
            StoreError::NotFound
        }
        sqlx::Error::Database(db) if is_unique_violation(&*db) => {
            // the driver text names the colliding values, keep it server-side
            info!("{what}: uniqueness violation: {db}");
            StoreError::Conflict
        }
        sqlx::Error::PoolTimedOut => {
            warn!("{what}: timed out waiting for a connection");
            StoreError::Timeout
        }
        e => {
            error!("{what}: {e:?}");
            StoreError::Internal
        }
    }
}

fn is_unique_violation(err: &dyn DatabaseError) -> bool {
    if let Some(mysql) = err.try_downcast_ref::<MySqlDatabaseError>() {
        return mysql.number() == ER_DUP_ENTRY;
    }

    matches!(
        err.code().as_deref(),
        Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::mock;
    use crate::user::Profile;

    fn jane(hash: &str) -> NewUser {
        NewUser {
            profile: Profile {
                last_name: "Doe".into(),
                first_name: "Jane".into(),
                sex: "F".into(),
            },
            password_hash: hash.into(),
        }
    }

    #[tokio::test]
    async fn created_user_is_found_by_id() {
        let store = mock::create_store().await;

        let id = store.create_user(&jane("$2b$04$notarealhash")).await.unwrap();
        assert!(id > 0);

        let found = store.find_by_id(id).await.unwrap();
        assert_eq!(found.password_hash, "$2b$04$notarealhash");
        assert_eq!(
            found.into_profile(),
            Profile {
                last_name: "Doe".into(),
                first_name: "Jane".into(),
                sex: "F".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let store = mock::create_store().await;

        assert_eq!(store.find_by_id(42).await.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn duplicate_identity_conflicts() {
        let store = mock::create_store().await;

        store.create_user(&jane("a")).await.unwrap();
        let second = store.create_user(&jane("b")).await;

        assert_eq!(second.unwrap_err(), StoreError::Conflict);
        assert_eq!(mock::count_users(&store).await, 1);
    }

    #[tokio::test]
    async fn slow_round_trip_times_out() {
        let mut store = mock::create_store().await;
        store.timeout = Duration::from_millis(20);

        let r = store
            .bounded("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, sqlx::Error>(())
            })
            .await;

        assert_eq!(r.unwrap_err(), StoreError::Timeout);
    }
}
