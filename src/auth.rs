use crate::domain::user::driven_ports::PasswordHasher;
use crate::domain::user::driving_ports::UserPort;
use crate::domain::user::{Identity, Role, UserService};
use crate::dto::auth::MAX_PASSWORD_BYTES;
use crate::persistence::db_user_driven_ports::DbReadUsers;
use crate::routing_utils::{ApiErrorResponse, Failure, original_path};
use crate::SharedData;
use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Claims carried by every issued bearer token
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys plus how long issued tokens stay valid
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl: chrono::Duration) -> Self {
        JwtKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, anyhow::Error> {
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .context("computing a token expiry")?;
        let claims = Claims {
            sub: identity.username.clone(),
            role: identity.role.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("signing a bearer token")
    }

    /// Checks signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;

        Ok(token_data.claims)
    }
}

/// [PasswordHasher] backed by bcrypt
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn with_cost(cost: u32) -> Self {
        BcryptHasher { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, anyhow::Error> {
        anyhow::ensure!(
            password.len() <= MAX_PASSWORD_BYTES,
            "password exceeds bcrypt's {MAX_PASSWORD_BYTES} byte limit"
        );
        bcrypt::hash(password, self.cost).context("hashing a password with bcrypt")
    }

    /// Passwords past the byte limit never match, bcrypt would only compare their prefix
    fn verify(&self, password: &str, password_hash: &str) -> Result<bool, anyhow::Error> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        bcrypt::verify(password, password_hash).context("verifying a bcrypt password hash")
    }
}

/// The caller behind a request, established from its bearer token. The user is looked up again
/// on every request so role changes and removed users take effect immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Role,
}

/// Pulls the token out of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, Failure> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Failure::Unauthorized("missing bearer token".to_owned()))?;
    let header_text = header_value
        .to_str()
        .map_err(|_| Failure::Unauthorized("authorization header is not valid text".to_owned()))?;
    let token = header_text
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| {
            Failure::Unauthorized("authorization header must use the Bearer scheme".to_owned())
        })?;

    if token.is_empty() {
        return Err(Failure::Unauthorized("missing bearer token".to_owned()));
    }

    Ok(token)
}

/// Fails with [Failure::Forbidden] unless the caller's role covers `required`
pub fn require_role(caller: &AuthenticatedUser, required: Role) -> Result<(), Failure> {
    if caller.role.grants(required) {
        return Ok(());
    }

    debug!(
        "{} with role {} attempted an operation requiring {required}",
        caller.username, caller.role
    );
    Err(Failure::Forbidden(format!("requires role {required}")))
}

#[axum::async_trait]
impl FromRequestParts<Arc<SharedData>> for AuthenticatedUser {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<SharedData>,
    ) -> Result<Self, Self::Rejection> {
        let path = original_path(&parts.extensions, &parts.uri);

        let token = bearer_token(&parts.headers).map_err(|failure| failure.at(&path))?;
        let claims = state.jwt_keys.verify(token).map_err(|err| {
            Failure::Unauthorized(format!("invalid bearer token ({err})")).at(&path)
        })?;

        let mut ext_cxn = state.ext_cxn.clone();
        let user_service = UserService {};
        let identity = user_service
            .resolve_identity(&claims.sub, &mut ext_cxn, &DbReadUsers {})
            .await
            .map_err(|err| Failure::from(err).at(&path))?;

        Ok(AuthenticatedUser {
            username: identity.username,
            role: identity.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use speculoos::prelude::*;

    fn identity(role: Role) -> Identity {
        Identity {
            username: "alice".to_owned(),
            password_hash: "irrelevant".to_owned(),
            role,
        }
    }

    mod jwt_keys {
        use super::*;

        #[test]
        fn issued_token_verifies_to_same_identity() {
            let keys = JwtKeys::new(b"test-secret", chrono::Duration::minutes(5));

            let token = keys.issue(&identity(Role::Admin)).expect("token should be issued");
            let claims = keys.verify(&token);
            assert_that!(claims)
                .is_ok()
                .matches(|claims| claims.sub == "alice" && claims.role == "ADMIN");
        }

        #[test]
        fn rejects_token_signed_with_other_secret() {
            let keys = JwtKeys::new(b"test-secret", chrono::Duration::minutes(5));
            let impostor = JwtKeys::new(b"not-the-secret", chrono::Duration::minutes(5));

            let token = impostor
                .issue(&identity(Role::Admin))
                .expect("token should be issued");
            assert_that!(keys.verify(&token)).is_err();
        }

        #[test]
        fn rejects_expired_token() {
            let keys = JwtKeys::new(b"test-secret", chrono::Duration::minutes(-10));

            let token = keys.issue(&identity(Role::User)).expect("token should be issued");
            assert_that!(keys.verify(&token)).is_err();
        }

        #[test]
        fn rejects_garbage() {
            let keys = JwtKeys::new(b"test-secret", chrono::Duration::minutes(5));

            assert_that!(keys.verify("definitely.not.ajwt")).is_err();
        }
    }

    mod bcrypt_hasher {
        use super::*;

        #[test]
        fn hash_is_salted_and_verifiable() {
            let hasher = BcryptHasher::with_cost(4);

            let first = hasher.hash("hunter22").expect("hashing should work");
            let second = hasher.hash("hunter22").expect("hashing should work");
            assert_ne!(first, second);
            assert_ne!("hunter22", first);
            assert_that!(hasher.verify("hunter22", &first)).is_ok_containing(true);
            assert_that!(hasher.verify("hunter23", &first)).is_ok_containing(false);
        }

        #[test]
        fn refuses_passwords_bcrypt_would_truncate() {
            let hasher = BcryptHasher::with_cost(4);
            let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
            let stored = hasher.hash(&at_limit).expect("hashing should work");

            assert_that!(hasher.hash(&format!("{at_limit}X"))).is_err();
            assert_that!(hasher.verify(&format!("{at_limit}Y"), &stored)).is_ok_containing(false);
            assert_that!(hasher.verify(&at_limit, &stored)).is_ok_containing(true);
        }
    }

    mod bearer_token {
        use super::*;

        #[test]
        fn extracts_token() {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));

            assert_that!(bearer_token(&headers)).is_ok_containing("abc.def.ghi");
        }

        #[test]
        fn missing_header_is_unauthorized() {
            let headers = HeaderMap::new();
            let result = bearer_token(&headers);

            assert_that!(result)
                .is_err()
                .matches(|failure| matches!(failure, Failure::Unauthorized(_)));
        }

        #[test]
        fn other_schemes_are_unauthorized() {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic YWxpY2U6cHc="));

            assert_that!(bearer_token(&headers))
                .is_err()
                .matches(|failure| matches!(failure, Failure::Unauthorized(_)));
        }
    }

    mod require_role {
        use super::*;

        #[test]
        fn admin_passes_admin_gate() {
            let caller = AuthenticatedUser {
                username: "root".to_owned(),
                role: Role::Admin,
            };

            assert_that!(require_role(&caller, Role::Admin)).is_ok();
        }

        #[test]
        fn user_is_forbidden_from_admin_gate() {
            let caller = AuthenticatedUser {
                username: "alice".to_owned(),
                role: Role::User,
            };

            assert_that!(require_role(&caller, Role::Admin))
                .is_err()
                .matches(|failure| matches!(failure, Failure::Forbidden(_)));
            assert_that!(require_role(&caller, Role::User)).is_ok();
        }
    }
}
