use crate::domain::user::driving_ports::{IdentityError, LoginError, RegisterError, UserPort};
use crate::external_connections::{ExternalConnectivity, Transactable, TransactionHandle};
use anyhow::Context;
use derive_more::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Authority granted to a user. Registration always yields [Role::User], admins are assigned
/// out of band.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[display("USER")]
    User,
    #[display("ADMIN")]
    Admin,
}

impl Role {
    /// Whether a holder of this role may do what `required` allows. Admins can do anything.
    pub fn grants(&self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::User => required == Role::User,
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(anyhow::anyhow!("unknown role {other:?}")),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TodoUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct CreateUser {
    pub username: String,
    pub password: String,
}

/// What actually gets stored for a new user, the password already hashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Everything token issuance and authorization need to know about a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl From<TodoUser> for Identity {
    fn from(user: TodoUser) -> Self {
        Identity {
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        }
    }
}

pub mod driven_ports {
    use super::*;

    pub trait UserReader: Sync {
        async fn by_username(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<TodoUser>, anyhow::Error>;
    }

    pub trait UserWriter: Sync {
        /// Returns None when the username is already stored
        async fn create_user(
            &self,
            user: &NewUserRecord,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<TodoUser>, anyhow::Error>;
    }

    pub trait DetectUser: Sync {
        async fn username_exists(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;
    }

    /// One-way salted password hashing. Implementations may be slow on purpose, callers run them
    /// on the blocking pool.
    #[cfg_attr(test, mockall::automock)]
    pub trait PasswordHasher: Send + Sync + 'static {
        fn hash(&self, password: &str) -> Result<String, anyhow::Error>;
        fn verify(&self, password: &str, password_hash: &str) -> Result<bool, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RegisterError {
        #[error("username already taken")]
        UsernameTaken,
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }

    #[derive(Debug, Error)]
    pub enum IdentityError {
        #[error("user not found: {0}")]
        UserNotFound(String),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }

    #[derive(Debug, Error)]
    pub enum LoginError {
        #[error("invalid username or password")]
        BadCredentials,
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }


    pub trait UserPort {
        async fn register(
            &self,
            new_user: &CreateUser,
            ext_cxn: &impl Transactable,
            u_writer: &impl driven_ports::UserWriter,
            u_detect: &impl driven_ports::DetectUser,
            hasher: &Arc<impl driven_ports::PasswordHasher>,
        ) -> Result<TodoUser, RegisterError>;
        async fn find_by_username(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
            u_reader: &impl driven_ports::UserReader,
        ) -> Result<Option<TodoUser>, anyhow::Error>;
        async fn resolve_identity(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
            u_reader: &impl driven_ports::UserReader,
        ) -> Result<Identity, IdentityError>;
        async fn login(
            &self,
            username: &str,
            password: &str,
            ext_cxn: &mut impl ExternalConnectivity,
            u_reader: &impl driven_ports::UserReader,
            hasher: &Arc<impl driven_ports::PasswordHasher>,
        ) -> Result<Identity, LoginError>;
    }
}

pub struct UserService {}

impl driving_ports::UserPort for UserService {
    async fn register(
        &self,
        new_user: &CreateUser,
        ext_cxn: &impl Transactable,
        u_writer: &impl driven_ports::UserWriter,
        u_detect: &impl driven_ports::DetectUser,
        hasher: &Arc<impl driven_ports::PasswordHasher>,
    ) -> Result<TodoUser, RegisterError> {
        let password_hash = hash_password(hasher, &new_user.password)
            .await
            .context("hashing a new user's password")?;

        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to register a user")?;
        let taken = u_detect
            .username_exists(&new_user.username, &mut txn)
            .await
            .context("checking whether a username is taken")?;
        if taken {
            debug!("Rejected registration for taken username {}", new_user.username);
            return Err(RegisterError::UsernameTaken);
        }

        let record = NewUserRecord {
            username: new_user.username.clone(),
            password_hash,
            role: Role::User,
        };
        let Some(created) = u_writer
            .create_user(&record, &mut txn)
            .await
            .context("storing a new user")?
        else {
            debug!("Username {} was claimed by a concurrent registration", new_user.username);
            return Err(RegisterError::UsernameTaken);
        };
        txn.commit().await.context("committing a new user")?;

        info!("Registered user {}", created.username);
        Ok(created)
    }

    async fn find_by_username(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
        u_reader: &impl driven_ports::UserReader,
    ) -> Result<Option<TodoUser>, anyhow::Error> {
        u_reader
            .by_username(username, &mut *ext_cxn)
            .await
            .context("looking up a user by username")
    }

    async fn resolve_identity(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
        u_reader: &impl driven_ports::UserReader,
    ) -> Result<Identity, IdentityError> {
        let user = self
            .find_by_username(username, ext_cxn, u_reader)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(username.to_owned()))?;

        Ok(user.into())
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        ext_cxn: &mut impl ExternalConnectivity,
        u_reader: &impl driven_ports::UserReader,
        hasher: &Arc<impl driven_ports::PasswordHasher>,
    ) -> Result<Identity, LoginError> {
        let Some(user) = self.find_by_username(username, ext_cxn, u_reader).await? else {
            debug!("Login attempted for unknown user {username}");
            return Err(LoginError::BadCredentials);
        };

        let password_matches = verify_password(hasher, password, user.password_hash.clone())
            .await
            .context("verifying a password")?;
        if !password_matches {
            debug!("Wrong password supplied for {username}");
            return Err(LoginError::BadCredentials);
        }

        Ok(user.into())
    }
}

async fn hash_password(
    hasher: &Arc<impl driven_ports::PasswordHasher>,
    password: &str,
) -> Result<String, anyhow::Error> {
    let hasher = Arc::clone(hasher);
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .context("joining the password hashing task")?
}

async fn verify_password(
    hasher: &Arc<impl driven_ports::PasswordHasher>,
    password: &str,
    password_hash: String,
) -> Result<bool, anyhow::Error> {
    let hasher = Arc::clone(hasher);
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
        .await
        .context("joining the password verification task")?
}

#[cfg(test)]
mod tests {
    use super::driven_ports::MockPasswordHasher;
    use super::test_util::*;
    use super::*;
    use crate::domain::test_util::Connectivity;
    use crate::domain::user::driving_ports::UserPort;
    use crate::external_connections;
    use mockall::predicate::eq;
    use speculoos::prelude::*;
    use std::sync::RwLock;
    use std::time::{Duration, Instant};

    fn prefixing_hasher() -> MockPasswordHasher {
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_hash()
            .returning(|password| Ok(format!("hashed:{password}")));
        hasher
            .expect_verify()
            .returning(|password, password_hash| Ok(password_hash == format!("hashed:{password}")));

        hasher
    }

    #[test]
    fn admin_grants_everything() {
        assert!(Role::Admin.grants(Role::Admin));
        assert!(Role::Admin.grants(Role::User));
        assert!(Role::User.grants(Role::User));
        assert!(!Role::User.grants(Role::Admin));
    }

    #[test]
    fn role_names_round_trip_through_text() {
        assert_eq!("ADMIN", Role::Admin.to_string());
        assert_that!(Role::from_str("USER")).is_ok_containing(Role::User);
        assert_that!(Role::from_str("superuser")).is_err();
    }

    mod register {
        use super::*;

        #[tokio::test]
        async fn stores_hash_not_password() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let mut hasher = MockPasswordHasher::new();
            hasher
                .expect_hash()
                .with(eq("hunter22"))
                .times(1)
                .returning(|_| Ok("$2b$04$somesaltandhash".to_owned()));

            let registered = UserService {}
                .register(
                    &CreateUser {
                        username: "alice".to_owned(),
                        password: "hunter22".to_owned(),
                    },
                    &ext_cxn,
                    &user_persist,
                    &user_persist,
                    &Arc::new(hasher),
                )
                .await;
            assert_that!(registered).is_ok().matches(|user| {
                user.id == 1
                    && user.username == "alice"
                    && user.password_hash == "$2b$04$somesaltandhash"
                    && user.role == Role::User
            });

            let locked_persist = user_persist.read().expect("user persist rw lock poisoned");
            assert_ne!("hunter22", locked_persist.users[0].password_hash);
            assert_eq!(1, ext_cxn.commit_count());
        }

        #[tokio::test]
        async fn rejects_taken_username() {
            let user_persist = RwLock::new(InMemoryUserPersistence::new_with_users(&[
                user_named("alice"),
            ]));
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let registered = UserService {}
                .register(
                    &CreateUser {
                        username: "alice".to_owned(),
                        password: "different".to_owned(),
                    },
                    &ext_cxn,
                    &user_persist,
                    &user_persist,
                    &Arc::new(prefixing_hasher()),
                )
                .await;
            let Err(err @ RegisterError::UsernameTaken) = registered else {
                panic!("Expected a taken username, got {registered:#?}");
            };
            assert_eq!("username already taken", err.to_string());

            let locked_persist = user_persist.read().expect("user persist rw lock poisoned");
            assert_eq!(1, locked_persist.users.len());
            assert_eq!(0, ext_cxn.commit_count());
        }

        #[tokio::test]
        async fn propagates_hashing_failure() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let mut hasher = MockPasswordHasher::new();
            hasher
                .expect_hash()
                .returning(|_| Err(anyhow::anyhow!("out of entropy")));

            let registered = UserService {}
                .register(
                    &user_named("bob"),
                    &ext_cxn,
                    &user_persist,
                    &user_persist,
                    &Arc::new(hasher),
                )
                .await;
            let Err(RegisterError::PortError(_)) = registered else {
                panic!("Expected a port error, got {registered:#?}");
            };
        }

        #[tokio::test]
        async fn propagates_port_error() {
            let mut raw_persist = InMemoryUserPersistence::new();
            raw_persist.connectivity = Connectivity::Disconnected;
            let user_persist = RwLock::new(raw_persist);
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let registered = UserService {}
                .register(
                    &user_named("bob"),
                    &ext_cxn,
                    &user_persist,
                    &user_persist,
                    &Arc::new(prefixing_hasher()),
                )
                .await;
            let Err(RegisterError::PortError(_)) = registered else {
                panic!("Expected a port error, got {registered:#?}");
            };
            assert_eq!(0, ext_cxn.commit_count());
        }

        /// Reports every username as free, like a check that ran before a concurrent insert
        struct StaleDetect;

        impl driven_ports::DetectUser for StaleDetect {
            async fn username_exists(
                &self,
                _: &str,
                _: &mut impl ExternalConnectivity,
            ) -> Result<bool, anyhow::Error> {
                Ok(false)
            }
        }

        #[tokio::test]
        async fn lost_insert_race_is_taken_username() {
            let user_persist = RwLock::new(InMemoryUserPersistence::new_with_users(&[
                user_named("alice"),
            ]));
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let registered = UserService {}
                .register(
                    &user_named("alice"),
                    &ext_cxn,
                    &user_persist,
                    &StaleDetect,
                    &Arc::new(prefixing_hasher()),
                )
                .await;
            let Err(RegisterError::UsernameTaken) = registered else {
                panic!("Expected a taken username, got {registered:#?}");
            };
            assert_eq!(0, ext_cxn.commit_count());
        }

        #[tokio::test]
        async fn slow_hashing_leaves_runtime_free() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let mut hasher = MockPasswordHasher::new();
            hasher.expect_hash().returning(|password| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(format!("hashed:{password}"))
            });
            let hasher = Arc::new(hasher);
            let started = Instant::now();
            let bob = user_named("bob");

            let (registered, timer_fired_after) = tokio::join!(
                UserService {}.register(
                    &bob,
                    &ext_cxn,
                    &user_persist,
                    &user_persist,
                    &hasher,
                ),
                async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    started.elapsed()
                }
            );

            assert_that!(registered).is_ok();
            assert!(
                timer_fired_after < Duration::from_millis(250),
                "timer was held up for {timer_fired_after:?}"
            );
        }
    }

    mod find_by_username {
        use super::*;

        #[tokio::test]
        async fn absent_user_is_none() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let found = UserService {}
                .find_by_username("nobody", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(found).is_ok().is_none();
        }

        #[tokio::test]
        async fn finds_existing_user() {
            let user_persist = RwLock::new(InMemoryUserPersistence::new_with_users(&[
                user_named("alice"),
                user_named("bob"),
            ]));
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let found = UserService {}
                .find_by_username("bob", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(found)
                .is_ok()
                .is_some()
                .matches(|user| user.id == 2 && user.username == "bob");
        }
    }

    mod resolve_identity {
        use super::*;

        #[tokio::test]
        async fn exposes_hash_and_role() {
            let mut raw_persist = InMemoryUserPersistence::new_with_users(&[user_named("root")]);
            raw_persist.users[0].role = Role::Admin;
            let user_persist = RwLock::new(raw_persist);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let identity = UserService {}
                .resolve_identity("root", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(identity).is_ok_containing(Identity {
                username: "root".to_owned(),
                password_hash: "hashed:password".to_owned(),
                role: Role::Admin,
            });
        }

        #[tokio::test]
        async fn unknown_user_is_not_found() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let identity = UserService {}
                .resolve_identity("ghost", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(identity)
                .is_err()
                .matches(|err| matches!(err, IdentityError::UserNotFound(name) if name == "ghost"));
        }
    }

    mod login {
        use super::*;

        #[tokio::test]
        async fn happy_path() {
            let user_persist = RwLock::new(InMemoryUserPersistence::new_with_users(&[
                user_named("alice"),
            ]));
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let identity = UserService {}
                .login(
                    "alice",
                    "password",
                    &mut ext_cxn,
                    &user_persist,
                    &Arc::new(prefixing_hasher()),
                )
                .await;
            assert_that!(identity)
                .is_ok()
                .matches(|identity| identity.username == "alice" && identity.role == Role::User);
        }

        #[tokio::test]
        async fn wrong_password_is_bad_credentials() {
            let user_persist = RwLock::new(InMemoryUserPersistence::new_with_users(&[
                user_named("alice"),
            ]));
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let identity = UserService {}
                .login(
                    "alice",
                    "guess",
                    &mut ext_cxn,
                    &user_persist,
                    &Arc::new(prefixing_hasher()),
                )
                .await;
            assert_that!(identity)
                .is_err()
                .matches(|err| matches!(err, LoginError::BadCredentials));
        }

        #[tokio::test]
        async fn unknown_user_is_bad_credentials() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let mut hasher = MockPasswordHasher::new();
            hasher.expect_verify().never();

            let identity = UserService {}
                .login("ghost", "password", &mut ext_cxn, &user_persist, &Arc::new(hasher))
                .await;
            assert_that!(identity)
                .is_err()
                .matches(|err| matches!(err, LoginError::BadCredentials));
        }
    }
}
