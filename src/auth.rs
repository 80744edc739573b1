use std::{fmt, result};

use log::{error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use warp::http::{Method, StatusCode};

use crate::store::{CredentialStore, StoreError};
use crate::user::{NewUser, Profile};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthError {
    MethodNotAllowed,
    StoreUnavailable,
    InvalidPayload,
    InvalidFields,
    MissingCredentials,
    /// Unknown id and wrong password alike.
    InvalidCredentials,
    Conflict,
    Internal,
}

pub type Result<T> = result::Result<T, AuthError>;

impl AuthError {
    pub fn code(self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method_not_allowed",
            Self::StoreUnavailable => "store_unavailable",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidFields => "invalid_fields",
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl From<AuthError> for StatusCode {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AuthError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InvalidPayload => StatusCode::BAD_REQUEST,
            AuthError::InvalidFields => StatusCode::BAD_REQUEST,
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => Self::Conflict,
            StoreError::Timeout => Self::StoreUnavailable,
            // login handles a missing row itself, so reaching here is a bug
            StoreError::NotFound => Self::Internal,
            StoreError::Internal => Self::Internal,
        }
    }
}

// missing fields decode as empty and are caught by validation
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Registration {
    #[serde(rename = "nom")]
    last_name: String,
    #[serde(rename = "prenom")]
    first_name: String,
    #[serde(rename = "sexe")]
    sex: String,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Credentials {
    #[serde(rename = "id_utilisateur")]
    user_id: i64,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub message: &'static str,
    #[serde(rename = "id_utilisateur")]
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoggedIn {
    pub message: &'static str,
    pub user: Account,
}

#[derive(Debug, Serialize)]
pub struct Account {
    #[serde(rename = "id_utilisateur")]
    pub id: i64,
    #[serde(flatten)]
    pub profile: Profile,
}

impl fmt::Debug for Registration {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Registration")
            .field("last_name", &self.last_name)
            .field("first_name", &self.first_name)
            .field("sex", &self.sex)
            .field("password_len", &self.password.chars().count())
            .finish()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Registration {
    fn validate(&self) -> Result<()> {
        let filled = !self.last_name.is_empty() && !self.first_name.is_empty() && !self.sex.is_empty();

        if filled && self.password.chars().count() >= MIN_PASSWORD_LEN {
            Ok(())
        } else {
            Err(AuthError::InvalidFields)
        }
    }
}

impl Credentials {
    fn validate(&self) -> Result<()> {
        (self.user_id > 0 && !self.password.is_empty())
            .then_some(())
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Registration and login over an optional credential store.
///
/// Without a store every request that gets past the method check fails with
/// `StoreUnavailable`; the rest of the server keeps working.
pub struct AuthService {
    store: Option<CredentialStore>,
    cost: u32,
    // verified against when the id is unknown, so misses cost as much as mismatches
    decoy_hash: String,
}

impl AuthService {
    pub fn new(store: Option<CredentialStore>, cost: u32) -> result::Result<Self, bcrypt::BcryptError> {
        let decoy_hash = bcrypt::hash("not a password anyone has", cost)?;

        Ok(Self {
            store,
            cost,
            decoy_hash,
        })
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&CredentialStore> {
        self.store.as_ref().ok_or(AuthError::StoreUnavailable)
    }

    pub async fn register(&self, method: &Method, body: &[u8]) -> Result<Registered> {
        check_method(method)?;
        let store = self.store()?;

        let registration: Registration = decode(body)?;
        info!("register attempt: {registration:?}");
        registration.validate()?;

        let Registration {
            last_name,
            first_name,
            sex,
            password,
        } = registration;

        let password_hash = self.hash(password).await?;
        let user = NewUser {
            profile: Profile {
                last_name,
                first_name,
                sex,
            },
            password_hash,
        };

        let id = store.create_user(&user).await?;
        info!("user {id} registered");

        Ok(Registered {
            message: "user created",
            id,
        })
    }

    pub async fn login(&self, method: &Method, body: &[u8]) -> Result<LoggedIn> {
        check_method(method)?;
        let store = self.store()?;

        let credentials: Credentials = decode(body)?;
        credentials.validate()?;

        let Credentials { user_id, password } = credentials;

        let stored = match store.find_by_id(user_id).await {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let hash = match &stored {
            Some(user) => user.password_hash.clone(),
            None => self.decoy_hash.clone(),
        };
        let matches = verify(password, hash).await?;

        match stored {
            Some(user) if matches => {
                info!("user {user_id} logged in");
                Ok(LoggedIn {
                    message: "login ok",
                    user: Account {
                        id: user_id,
                        profile: user.into_profile(),
                    },
                })
            }
            Some(_) => {
                warn!("wrong password for user {user_id}");
                Err(AuthError::InvalidCredentials)
            }
            None => {
                warn!("rejecting non-existent user {user_id}");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn hash(&self, password: String) -> Result<String> {
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| {
                error!("hashing task: {e:?}");
                AuthError::Internal
            })?
            .map_err(|e| {
                error!("couldn't hash password: {e:?}");
                AuthError::Internal
            })
    }
}

async fn verify(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            error!("verify task: {e:?}");
            AuthError::Internal
        })?
        .map_err(|e| {
            error!("stored hash unusable: {e:?}");
            AuthError::Internal
        })
}

fn check_method(method: &Method) -> Result<()> {
    if *method == Method::POST {
        Ok(())
    } else {
        Err(AuthError::MethodNotAllowed)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("undecodable payload: {e}");
        AuthError::InvalidPayload
    })
}
