//! Account registration as an explicit saga.
//!
//! ```text
//! Pending --commit--> Invited --redeem--> Active
//!                        |
//!                        +--delivery failed--> Abandoned (deleted | orphaned)
//! ```
//!
//! The commit is a real transaction (user + token). Delivery of the
//! secret is an external side effect that cannot join it, so a failed
//! delivery is undone by a compensating delete. That delete is best effort:
//! if it fails too, the account stays behind inactive. Inactive accounts
//! cannot authenticate, and their token expires; the orphan is reported
//! alongside the delivery failure, never instead of it.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use social_db::Database;
use social_db::credentials::{generate_token_secret, token_hash};
use social_types::Error;
use social_types::models::{NewUser, User};

use crate::notifier::{NotifyError, Notifier};

pub const INVITE_SUBJECT: &str = "Activate your account";

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationState {
    Pending,
    Invited { user_id: i64 },
    Active { user_id: i64 },
    Abandoned { user_id: i64, compensation: Compensation },
}

/// Outcome of undoing a committed registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    Deleted,
    /// No invited account to undo; nothing was touched.
    NothingCommitted,
    /// The delete failed; the inactive account remains.
    Orphaned(Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Store(#[from] Error),

    #[error("invitation could not be delivered")]
    Delivery {
        source: NotifyError,
        compensation: Compensation,
    },

    /// Delivery of a re-issued token failed. Nothing to undo: the account
    /// stays pending and may ask again.
    #[error("invitation could not be delivered")]
    Undelivered(#[source] NotifyError),
}

/// A committed invitation: the created user plus the plaintext secret,
/// which exists only in memory until it is handed to the notifier.
pub struct Invitation {
    pub user: User,
    secret: String,
    expiry_hours: i64,
}

impl std::fmt::Debug for Invitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invitation")
            .field("user", &self.user.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn invite_body(secret: &str, expiry_hours: i64) -> String {
    format!(
        "Your activation token is: {}\nExpires in: {} hours",
        secret, expiry_hours
    )
}

pub struct Registration {
    user: Option<NewUser>,
    state: RegistrationState,
}

impl Registration {
    pub fn new(user: NewUser) -> Self {
        Self {
            user: Some(user),
            state: RegistrationState::Pending,
        }
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    /// Phase 1: persist user and hashed token atomically.
    pub async fn commit(&mut self, db: &Database, ttl: chrono::Duration) -> Result<Invitation, Error> {
        let user = match (&self.state, self.user.take()) {
            (RegistrationState::Pending, Some(user)) => user,
            _ => return Err(Error::validation("registration already committed")),
        };

        let secret = generate_token_secret();
        let created = db.create_with_invite(user, token_hash(&secret), ttl).await?;

        self.state = RegistrationState::Invited {
            user_id: created.id,
        };
        Ok(Invitation {
            user: created,
            secret,
            expiry_hours: ttl.num_hours(),
        })
    }

    /// Phase 2: hand the plaintext secret to the notifier.
    pub async fn deliver(
        &mut self,
        notifier: &dyn Notifier,
        invitation: Invitation,
    ) -> Result<(), NotifyError> {
        let body = invite_body(&invitation.secret, invitation.expiry_hours);
        notifier
            .send(&invitation.user.email, INVITE_SUBJECT, &body)
            .await
    }

    /// Phase 3 (failure path): undo the commit. Never fails itself; the
    /// outcome is recorded in the state and returned.
    pub async fn compensate(&mut self, db: &Database) -> Compensation {
        let RegistrationState::Invited { user_id } = self.state else {
            debug!("Nothing to compensate in state {:?}", self.state);
            return Compensation::NothingCommitted;
        };

        let compensation = match db.delete_user(user_id).await {
            Ok(()) => {
                info!("Compensated registration of user {}", user_id);
                Compensation::Deleted
            }
            Err(e) => {
                error!(
                    "Compensation failed for user {}: {}; account left inactive",
                    user_id, e
                );
                Compensation::Orphaned(e)
            }
        };

        self.state = RegistrationState::Abandoned {
            user_id,
            compensation: compensation.clone(),
        };
        compensation
    }
}

/// Run the whole saga. On success the account is `Invited` and the secret
/// is on its way to the user.
pub async fn register(
    db: &Database,
    notifier: &dyn Notifier,
    user: NewUser,
    ttl: chrono::Duration,
) -> Result<User, RegistrationError> {
    let mut registration = Registration::new(user);
    let invitation = registration.commit(db, ttl).await?;
    let created = invitation.user.clone();

    if let Err(source) = registration.deliver(notifier, invitation).await {
        warn!("Invitation delivery failed for user {}: {}", created.id, source);
        let compensation = registration.compensate(db).await;
        return Err(RegistrationError::Delivery {
            source,
            compensation,
        });
    }

    Ok(created)
}

/// `Invited -> Active`.
pub async fn activate(db: &Database, secret: &str, now: DateTime<Utc>) -> Result<User, Error> {
    db.redeem(secret, now).await
}

/// Replace the token of a still-pending account and send the new secret.
pub async fn reinvite(
    db: &Database,
    notifier: &dyn Notifier,
    user_id: i64,
    email: &str,
    ttl: chrono::Duration,
) -> Result<(), RegistrationError> {
    let secret = generate_token_secret();
    db.reissue_token(user_id, token_hash(&secret), ttl).await?;

    notifier
        .send(email, INVITE_SUBJECT, &invite_body(&secret, ttl.num_hours()))
        .await
        .map_err(RegistrationError::Undelivered)
}
