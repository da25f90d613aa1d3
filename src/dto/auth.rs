use super::not_blank;
use crate::domain;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// bcrypt ignores everything past this many bytes of a password
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Username and password, used for both registration and login. Only the username is ever
/// displayed.
#[derive(Deserialize, Display, Validate, ToSchema)]
#[display("{username}")]
#[cfg_attr(test, derive(Serialize))]
pub struct Credentials {
    #[validate(
        custom = "not_blank",
        length(max = 50, message = "must be at most 50 characters")
    )]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(custom = "usable_password")]
    #[schema(example = "correct horse battery staple")]
    pub password: String,
}

fn usable_password(password: &str) -> Result<(), ValidationError> {
    not_blank(password)?;
    if password.len() > MAX_PASSWORD_BYTES {
        let mut err = ValidationError::new("too_long");
        err.message = Some(format!("must be at most {MAX_PASSWORD_BYTES} bytes").into());
        return Err(err);
    }

    Ok(())
}

impl From<Credentials> for domain::user::CreateUser {
    fn from(value: Credentials) -> Self {
        domain::user::CreateUser {
            username: value.username,
            password: value.password,
        }
    }
}

/// DTO for a freshly registered user. The password hash is never exposed.
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug, PartialEq, Eq))]
pub struct RegisteredUser {
    #[schema(example = 4)]
    pub id: i64,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "USER")]
    pub role: String,
}

impl From<domain::user::TodoUser> for RegisteredUser {
    fn from(value: domain::user::TodoUser) -> Self {
        RegisteredUser {
            id: value.id,
            username: value.username,
            role: value.role.to_string(),
        }
    }
}

/// DTO carrying an issued bearer token
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct TokenResponse {
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(token: String) -> Self {
        TokenResponse {
            token,
            token_type: "Bearer".to_owned(),
        }
    }
}
