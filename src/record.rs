//! Authenticatable records and the shapes used to query and patch them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Identifier of a record within its collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A user-like record that can log in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthRecord {
    /// Store-assigned id.
    pub id: RecordId,
    /// Login identifier (usually an email address), unique per collection.
    pub identifier: String,
    /// Native credential as a PHC string; empty if none has been set yet.
    #[serde(skip_serializing)]
    pub credential: String,
    /// `true` while the legacy hash still has to be checked on login.
    pub migration_pending: bool,
    /// Hash imported from the legacy platform. Hidden from normal reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_hash: Option<String>,
}

impl AuthRecord {
    /// Drops fields that are hidden from ordinary reads.
    #[must_use]
    pub fn without_hidden(mut self) -> Self {
        self.legacy_hash = None;
        self
    }

    /// The admin display state of the migration flag.
    #[must_use]
    pub fn display_state(&self) -> DisplayState {
        DisplayState::from(Some(self.migration_pending))
    }
}

/// A record as handed over by the out-of-band import.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewRecord {
    /// Login identifier.
    pub identifier: String,
    /// Native plaintext password, if the import already knows one.
    #[serde(default)]
    pub password: Option<String>,
    /// Legacy hash; a non-empty value marks the record for migration.
    #[serde(default)]
    pub legacy_hash: Option<String>,
}

impl NewRecord {
    /// A record imported from the legacy platform with only its old hash.
    pub fn legacy(identifier: impl Into<String>, legacy_hash: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: None,
            legacy_hash: Some(legacy_hash.into()),
        }
    }

    /// A record that already has a native password.
    pub fn native(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: Some(password.into()),
            legacy_hash: None,
        }
    }
}

/// Exact-match filter over authenticatable records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFilter {
    /// Identifier the record must have.
    pub identifier: String,
    /// Required value of the migration flag, if any.
    pub migration_pending: Option<bool>,
}

impl RecordFilter {
    /// Records with this identifier that still wait for migration.
    pub fn pending_migration(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            migration_pending: Some(true),
        }
    }

    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &AuthRecord) -> bool {
        record.identifier == self.identifier
            && self
                .migration_pending
                .map_or(true, |pending| record.migration_pending == pending)
    }
}

/// A partial update. `None` leaves the field alone.
#[derive(Clone, Debug, Default)]
pub struct RecordPatch {
    /// New plaintext password; the store hashes it before saving.
    pub password: Option<Zeroizing<String>>,
    /// New value of the migration flag.
    pub migration_pending: Option<bool>,
    /// New legacy hash. An empty string clears it.
    pub legacy_hash: Option<String>,
    /// Precondition: apply the patch only if the stored flag has this value.
    pub expect_migration_pending: Option<bool>,
}

impl RecordPatch {
    /// The write that finishes a migration: store `plaintext` as the new
    /// password, clear the legacy hash and the flag, but only if no one else
    /// has done so in the meantime.
    #[must_use]
    pub fn complete_migration(plaintext: &str) -> Self {
        Self {
            password: Some(Zeroizing::new(plaintext.to_owned())),
            migration_pending: Some(false),
            legacy_hash: Some(String::new()),
            expect_migration_pending: Some(true),
        }
    }

    /// Whether the patch writes any migration bookkeeping field.
    #[must_use]
    pub fn touches_migration_fields(&self) -> bool {
        self.migration_pending.is_some() || self.legacy_hash.is_some()
    }
}

/// How the admin UI describes the migration flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    /// Still waiting for a login with the legacy password.
    Pending,
    /// Already migrated.
    Migrated,
    /// The flag has never been set.
    Unset,
}

impl DisplayState {
    /// Fixed description shown beneath the checkbox.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Pending => {
                "When this user signs in with their Wordpress password, this checkbox will turn off."
            }
            Self::Migrated => "The password has been migrated.",
            Self::Unset => "",
        }
    }
}

impl From<Option<bool>> for DisplayState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Pending,
            Some(false) => Self::Migrated,
            None => Self::Unset,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{AuthRecord, DisplayState, RecordFilter, RecordId, RecordPatch};

    fn record(pending: bool) -> AuthRecord {
        AuthRecord {
            id: RecordId::new(),
            identifier: "a@b.com".into(),
            credential: String::new(),
            migration_pending: pending,
            legacy_hash: pending.then(|| "$P$hash".to_owned()),
        }
    }

    #[test]
    fn pending_filter() {
        let filter = RecordFilter::pending_migration("a@b.com");
        assert!(filter.matches(&record(true)));
        assert!(!filter.matches(&record(false)));

        let other = RecordFilter::pending_migration("c@d.com");
        assert!(!other.matches(&record(true)));
    }

    #[test]
    fn display_states() {
        assert_eq!(record(true).display_state(), DisplayState::Pending);
        assert_eq!(record(false).display_state(), DisplayState::Migrated);
        assert_eq!(DisplayState::from(None), DisplayState::Unset);
        assert_eq!(
            DisplayState::Migrated.description(),
            "The password has been migrated."
        );
        assert!(DisplayState::Unset.description().is_empty());
    }

    #[test]
    fn hidden_fields_are_stripped_and_never_serialized_as_credential() {
        let visible = record(true).without_hidden();
        assert_eq!(visible.legacy_hash, None);

        let json = serde_json::to_value(&visible).unwrap();
        assert!(json.get("credential").is_none());
        assert!(json.get("legacy_hash").is_none());
        assert_eq!(json["migration_pending"], true);
    }

    #[test]
    fn completing_a_migration_is_conditional() {
        let patch = RecordPatch::complete_migration("oldpw");
        assert_eq!(patch.expect_migration_pending, Some(true));
        assert_eq!(patch.migration_pending, Some(false));
        assert_eq!(patch.legacy_hash.as_deref(), Some(""));
        assert_eq!(patch.password.as_deref().map(String::as_str), Some("oldpw"));
        assert!(patch.touches_migration_fields());
        assert!(!RecordPatch::default().touches_migration_fields());
    }
}
