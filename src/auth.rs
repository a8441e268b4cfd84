//! Normal authentication, the step that runs after the migration gate.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{record::RecordId, store::StoreError};

/// An issued login session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// The record that logged in.
    pub record_id: RecordId,
}

impl Session {
    /// Issues a session with a fresh random token.
    #[must_use]
    pub fn issue(record_id: RecordId) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            record_id,
        }
    }
}

/// Checks a password against the native credential and issues sessions.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns a session if `password` matches the native credential of the
    /// record identified by `identifier`, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Only backend failures are errors; a wrong password is `Ok(None)`.
    async fn login(
        &self,
        collection: &str,
        identifier: &str,
        password: &str,
    ) -> Result<Option<Session>, StoreError>;
}
