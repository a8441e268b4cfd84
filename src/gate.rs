//! The migration gate: runs before normal authentication and, when the
//! submitted password matches a pending legacy hash, rewrites the credential
//! into the native format.
//!
//! The gate never issues sessions and never rejects a login. Every path
//! except a failed write ends in normal authentication, which then checks
//! whatever credential the record holds.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::{
    config::PluginSettings,
    legacy::{LegacyScheme, LegacyVerifier, EQUALIZER_HASH},
    record::{RecordFilter, RecordId, RecordPatch},
    store::{Caller, FindOptions, RecordStore, StoreError, WriteOptions},
};

/// Why the gate left the record alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoActionReason {
    /// Identifier or password was empty; nothing was looked up.
    MissingCredentials,
    /// No record with this identifier is waiting for migration.
    NoMigrationCandidate,
    /// The record is flagged but carries no legacy hash.
    MissingLegacyHash,
    /// The password does not match the legacy hash.
    LegacyVerificationFailed,
    /// A concurrent login migrated the record first.
    AlreadyMigrated,
}

/// Result of [`MigrationGate::evaluate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was written.
    NoAction(NoActionReason),
    /// The credential was rewritten and the migration flag cleared.
    Migrated {
        /// The migrated record.
        record_id: RecordId,
    },
}

impl Outcome {
    /// Whether a migration happened.
    #[must_use]
    pub fn is_migrated(self) -> bool {
        matches!(self, Self::Migrated { .. })
    }
}

/// Failures that must abort the login attempt.
#[derive(Debug, Error)]
pub enum GateError {
    /// Looking up the migration candidate failed.
    #[error("failed to look up migration candidate: {0}")]
    Lookup(#[source] StoreError),
    /// The legacy password matched but the migrated credential was not saved.
    #[error("failed to persist migrated credential: {0}")]
    Persistence(#[source] StoreError),
    /// The blocking verification task did not complete.
    #[error("legacy verification did not complete: {0}")]
    Verification(#[from] JoinError),
}

/// Decides, per login attempt, whether to migrate a legacy credential.
#[derive(Clone)]
pub struct MigrationGate {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn LegacyVerifier>,
    equalize_timing: bool,
}

impl MigrationGate {
    /// Creates a gate with timing equalization enabled.
    pub fn new(store: Arc<dyn RecordStore>, verifier: Arc<dyn LegacyVerifier>) -> Self {
        Self {
            store,
            verifier,
            equalize_timing: true,
        }
    }

    /// Applies the gate-related settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &PluginSettings) -> Self {
        self.equalize_timing = settings.equalize_timing;
        self
    }

    /// When enabled, attempts without a usable legacy hash still run one
    /// legacy verification so they take about as long as a wrong password.
    #[must_use]
    pub fn equalize_timing(mut self, enabled: bool) -> Self {
        self.equalize_timing = enabled;
        self
    }

    /// Runs the migration check for one login attempt.
    ///
    /// # Errors
    ///
    /// [`GateError::Persistence`] when the legacy password matched but the
    /// credential could not be saved, [`GateError::Lookup`] when the candidate
    /// lookup failed. All other paths return an [`Outcome`].
    pub async fn evaluate(
        &self,
        collection: &str,
        identifier: &str,
        plaintext: &str,
    ) -> Result<Outcome, GateError> {
        if identifier.is_empty() || plaintext.is_empty() {
            return Ok(Outcome::NoAction(NoActionReason::MissingCredentials));
        }

        let filter = RecordFilter::pending_migration(identifier);
        let lookup = FindOptions {
            include_hidden: true,
            depth: 0,
        };
        let candidate = self
            .store
            .find(collection, &filter, lookup)
            .await
            .map_err(GateError::Lookup)?
            .into_iter()
            .next()
            .filter(|record| record.migration_pending);

        let Some(record) = candidate else {
            debug!(collection, "no legacy migration candidate");
            self.equalize(plaintext).await?;
            return Ok(Outcome::NoAction(NoActionReason::NoMigrationCandidate));
        };
        let record_id = record.id;

        let Some(legacy_hash) = record.legacy_hash.filter(|hash| !hash.is_empty()) else {
            warn!(collection, %record_id, "record flagged for migration has no legacy hash");
            self.equalize(plaintext).await?;
            return Ok(Outcome::NoAction(NoActionReason::MissingLegacyHash));
        };

        let scheme = LegacyScheme::detect(&legacy_hash).map_or("unknown", LegacyScheme::as_str);
        debug!(collection, %record_id, scheme, "checking legacy password");

        if !self.verify(plaintext, legacy_hash).await? {
            debug!(collection, %record_id, "legacy password mismatch");
            return Ok(Outcome::NoAction(NoActionReason::LegacyVerificationFailed));
        }

        let write = WriteOptions {
            include_hidden: true,
            depth: 0,
            caller: Caller::System,
        };
        match self
            .store
            .update(collection, record_id, RecordPatch::complete_migration(plaintext), write)
            .await
        {
            Ok(_) => {
                info!(collection, %record_id, scheme, "legacy password migrated");
                Ok(Outcome::Migrated { record_id })
            }
            Err(StoreError::Conflict(_)) => {
                debug!(collection, %record_id, "record was migrated concurrently");
                Ok(Outcome::NoAction(NoActionReason::AlreadyMigrated))
            }
            Err(err) => {
                error!(collection, %record_id, error = %err, "failed to persist migrated credential");
                Err(GateError::Persistence(err))
            }
        }
    }

    async fn verify(&self, plaintext: &str, hash: String) -> Result<bool, GateError> {
        let verifier = Arc::clone(&self.verifier);
        let plaintext = Zeroizing::new(plaintext.to_owned());

        let matched =
            tokio::task::spawn_blocking(move || verifier.verify(&plaintext, &hash)).await?;
        Ok(matched)
    }

    async fn equalize(&self, plaintext: &str) -> Result<(), GateError> {
        if self.equalize_timing {
            self.verify(plaintext, EQUALIZER_HASH.to_owned()).await?;
        }
        Ok(())
    }
}
