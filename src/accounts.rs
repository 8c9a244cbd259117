//! User accounts: registration, login and the guest flow.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tokio::task;
use tracing::{debug, info, instrument};

use crate::auth::{IssuedToken, PasswordHasher, TokenPurpose, TokenSigner};
use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Registration, User, UserId};
use crate::store::Store;

const BAD_LOGIN: &str = "Incorrect email or password";
const BAD_CREDENTIALS: &str = "Could not validate credentials";

/// A validated signup request.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Credentials supplied when a guest registers.
#[derive(Clone, Debug)]
pub struct GuestConversion {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn Store>,
    signer: TokenSigner,
    hasher: PasswordHasher,
    login_ttl: Duration,
}

impl Accounts {
    pub fn new(
        store: Arc<dyn Store>,
        signer: TokenSigner,
        hasher: PasswordHasher,
        login_ttl: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            hasher,
            login_ttl,
        }
    }

    #[instrument(skip_all, fields(username = %account.username))]
    pub async fn signup(&self, account: NewAccount) -> LedgerResult<User> {
        validate_email(&account.email)?;
        validate_username(&account.username)?;
        validate_password(&account.password)?;
        let password_hash = self.hash_password(account.password).await?;

        let mut tx = self.store.begin().await?;
        if tx.find_user_by_email(&account.email).await?.is_some() {
            return Err(LedgerError::conflict(
                "The user with this email already exists in the system",
            ));
        }
        if tx.find_user_by_username(&account.username).await?.is_some() {
            return Err(LedgerError::conflict(
                "The user with this username already exists in the system",
            ));
        }
        let user = User::registered(
            account.username,
            account.email,
            account.first_name,
            account.last_name,
            password_hash,
        );
        tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user = %user.id, "user registered");
        Ok(user)
    }

    /// Exchanges an email and password for a login token.
    pub async fn login(&self, email: &str, password: &str) -> LedgerResult<IssuedToken> {
        let mut tx = self.store.begin().await?;
        let user = tx.find_user_by_email(email).await?;
        drop(tx);

        let candidate = user
            .filter(|user| user.is_active && !user.is_guest)
            .and_then(|user| user.password_hash.map(|stored| (user.id, stored)));
        let Some((user_id, stored)) = candidate else {
            debug!("login rejected");
            return Err(LedgerError::unauthenticated(BAD_LOGIN));
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let verified = task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|err| {
                LedgerError::InvalidState(format!("password check failed: {err}"))
            })?;
        if !verified {
            debug!("login rejected");
            return Err(LedgerError::unauthenticated(BAD_LOGIN));
        }
        Ok(self.issue_login(user_id))
    }

    /// Creates a fresh guest account and logs it in.
    pub async fn guest_login(&self) -> LedgerResult<IssuedToken> {
        let suffix: [u8; 6] = rand::thread_rng().gen();
        let guest = User::guest(format!("guest_{}", hex::encode(suffix)));

        let mut tx = self.store.begin().await?;
        tx.insert_user(&guest).await?;
        tx.commit().await?;

        info!(user = %guest.id, "guest account created");
        Ok(self.issue_login(guest.id))
    }

    /// Turns a guest into a registered user in a single update.
    #[instrument(skip_all, fields(user = %user_id))]
    pub async fn convert_guest(
        &self,
        user_id: UserId,
        conversion: GuestConversion,
    ) -> LedgerResult<User> {
        validate_email(&conversion.email)?;
        validate_username(&conversion.username)?;
        validate_password(&conversion.password)?;
        let password_hash = self.hash_password(conversion.password).await?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("User not found"))?;
        if let Some(other) = tx.find_user_by_email(&conversion.email).await? {
            if other.id != user_id {
                return Err(LedgerError::conflict("Email already registered"));
            }
        }
        if let Some(other) = tx.find_user_by_username(&conversion.username).await? {
            if other.id != user_id {
                return Err(LedgerError::conflict("Username already taken"));
            }
        }

        let registered = user
            .register(Registration {
                email: conversion.email,
                username: conversion.username,
                password_hash,
                first_name: conversion.first_name,
                last_name: conversion.last_name,
            })
            .ok_or_else(|| LedgerError::conflict("User is already registered"))?;
        tx.replace_user(&registered).await?;
        tx.commit().await?;

        info!("guest converted to registered user");
        Ok(registered)
    }

    /// Resolves the active user named by a login token.
    pub async fn authenticate(&self, token: &str) -> LedgerResult<User> {
        let user_id = self
            .signer
            .verify(token, TokenPurpose::Login, Utc::now())
            .map_err(|err| {
                debug!(error = %err, "bearer token rejected");
                LedgerError::unauthenticated(BAD_CREDENTIALS)
            })?;
        let mut tx = self.store.begin().await?;
        tx.find_user(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| LedgerError::unauthenticated(BAD_CREDENTIALS))
    }

    /// Hashes on the blocking pool, before any transaction is opened.
    async fn hash_password(&self, password: String) -> LedgerResult<String> {
        let hasher = self.hasher.clone();
        task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| LedgerError::InvalidState(format!("hashing task failed: {err}")))?
            .map_err(|err| LedgerError::InvalidState(format!("hashing failed: {err}")))
    }

    fn issue_login(&self, user_id: UserId) -> IssuedToken {
        self.signer
            .issue(user_id, TokenPurpose::Login, self.login_ttl, Utc::now())
    }
}

fn validate_email(email: &str) -> LedgerResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(LedgerError::invalid_input("email is not valid")),
    }
}

fn validate_username(username: &str) -> LedgerResult<()> {
    if username.trim().is_empty() {
        return Err(LedgerError::invalid_input("username must not be empty"));
    }
    Ok(())
}

fn validate_password(password: &str) -> LedgerResult<()> {
    if password.is_empty() {
        return Err(LedgerError::invalid_input("password must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn accounts() -> Accounts {
        Accounts::new(
            Arc::new(MemoryStore::new()),
            TokenSigner::new("secret"),
            PasswordHasher::new(10),
            Duration::minutes(30),
        )
    }

    fn alice() -> NewAccount {
        NewAccount {
            email: "alice@example.com".into(),
            username: "alice".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            password: "password123".into(),
        }
    }

    #[tokio::test]
    async fn signup_then_login_authenticates() {
        let accounts = accounts();
        let user = accounts.signup(alice()).await.unwrap();
        assert!(!user.is_guest);

        let token = accounts.login("alice@example.com", "password123").await.unwrap();
        let me = accounts.authenticate(&token.token).await.unwrap();
        assert_eq!(me.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let accounts = accounts();
        accounts.signup(alice()).await.unwrap();

        let same_email = NewAccount {
            username: "other".into(),
            ..alice()
        };
        let same_username = NewAccount {
            email: "other@example.com".into(),
            ..alice()
        };
        for account in [same_email, same_username] {
            assert!(matches!(
                accounts.signup(account).await,
                Err(LedgerError::Conflict(_))
            ));
        }
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let accounts = accounts();
        accounts.signup(alice()).await.unwrap();
        assert!(matches!(
            accounts.login("alice@example.com", "nope").await,
            Err(LedgerError::Unauthenticated(_))
        ));
        assert!(matches!(
            accounts.login("nobody@example.com", "password123").await,
            Err(LedgerError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn guest_converts_once() {
        let accounts = accounts();
        let token = accounts.guest_login().await.unwrap();
        let guest = accounts.authenticate(&token.token).await.unwrap();
        assert!(guest.is_guest);
        assert!(guest.password_hash.is_none());

        let conversion = GuestConversion {
            email: "guest@example.com".into(),
            username: "former_guest".into(),
            password: "hunter22".into(),
            first_name: Some("Gus".into()),
            last_name: None,
        };
        let user = accounts
            .convert_guest(guest.id, conversion.clone())
            .await
            .unwrap();
        assert!(!user.is_guest);
        assert_eq!(user.email.as_deref(), Some("guest@example.com"));
        assert_eq!(user.first_name, "Gus");
        assert!(accounts.login("guest@example.com", "hunter22").await.is_ok());

        assert!(matches!(
            accounts.convert_guest(guest.id, conversion).await,
            Err(LedgerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn conversion_to_taken_email_conflicts() {
        let accounts = accounts();
        accounts.signup(alice()).await.unwrap();
        let token = accounts.guest_login().await.unwrap();
        let guest = accounts.authenticate(&token.token).await.unwrap();

        let err = accounts
            .convert_guest(
                guest.id,
                GuestConversion {
                    email: "alice@example.com".into(),
                    username: "new_name".into(),
                    password: "pw".into(),
                    first_name: None,
                    last_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let unchanged = accounts.authenticate(&token.token).await.unwrap();
        assert!(unchanged.is_guest);
    }

    #[tokio::test]
    async fn invalid_signup_fields_are_rejected() {
        let accounts = accounts();
        let bad_email = NewAccount {
            email: "not-an-email".into(),
            ..alice()
        };
        let empty_password = NewAccount {
            password: String::new(),
            ..alice()
        };
        for account in [bad_email, empty_password] {
            assert!(matches!(
                accounts.signup(account).await,
                Err(LedgerError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn garbage_token_is_unauthenticated() {
        assert!(matches!(
            accounts().authenticate("garbage").await,
            Err(LedgerError::Unauthenticated(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn signup_hashing_does_not_hold_the_store() {
        use crate::registry::MembershipRegistry;
        use std::time::{Duration as StdDuration, Instant};

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let accounts = Accounts::new(
            Arc::clone(&store),
            TokenSigner::new("secret"),
            PasswordHasher::new(200_000),
            Duration::minutes(30),
        );
        let registry = MembershipRegistry::new(store);

        let signup = tokio::spawn(async move { accounts.signup(alice()).await });
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let started = Instant::now();
        registry.groups_of(UserId::new()).await.unwrap();
        let waited = started.elapsed();

        let user = signup.await.unwrap().unwrap();
        assert!(!user.is_guest);
        assert!(
            waited < StdDuration::from_millis(50),
            "read waited {waited:?} behind a password hash"
        );
    }
}
