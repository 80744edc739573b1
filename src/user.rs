use serde::Serialize;

/// The public part of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    #[serde(rename = "sexe")]
    pub sex: String,
}

/// A row about to be inserted; `password_hash` is already bcrypt output.
#[derive(Debug)]
pub struct NewUser {
    pub profile: Profile,
    pub password_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StoredUser {
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub nom: String,
    pub prenom: String,
    pub sexe: String,
}

impl StoredUser {
    pub fn into_profile(self) -> Profile {
        let Self {
            password_hash: _,
            nom,
            prenom,
            sexe,
        } = self;

        Profile {
            last_name: nom,
            first_name: prenom,
            sex: sexe,
        }
    }
}
