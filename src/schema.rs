//! The host's collection/endpoint configuration and the plugin's pure
//! transformation of it.
//!
//! [`transform`] is called once at startup with the base configuration and
//! returns the extended one. Nothing here holds global state.

use serde::{Deserialize, Serialize};

use crate::{config::PluginSettings, record::DisplayState};

/// Handler name of the endpoint that parses JSON login bodies.
pub const JSON_BODY_HANDLER: &str = "json-body";
/// Handler name of the endpoint that runs the migration gate.
pub const MIGRATION_GATE_HANDLER: &str = "legacy-password-migration";
/// Component the client registers after the login form.
pub const LOGIN_INTERCEPTOR_COMPONENT: &str = "legacy-login-interceptor";

/// Which half of the plugin is being installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginSide {
    /// The server: adds the login endpoints.
    Server,
    /// The admin client: adds the login interceptor.
    Client,
}

/// Host configuration, reduced to what the plugin reads and extends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Collections known to the host.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    /// Custom endpoints, in registration order.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// Admin UI configuration.
    #[serde(default)]
    pub admin: AdminConfig,
}

impl HostConfig {
    /// Looks up a collection by slug.
    #[must_use]
    pub fn collection(&self, slug: &str) -> Option<&CollectionConfig> {
        self.collections
            .iter()
            .find(|collection| collection.slug == slug)
    }
}

/// A collection of records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection slug, as used in `/api/:collection/...`.
    pub slug: String,
    /// Whether records of this collection can log in.
    #[serde(default)]
    pub auth: bool,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl CollectionConfig {
    /// An empty collection with authentication enabled.
    pub fn auth(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            auth: true,
            fields: Vec::new(),
        }
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Field types the plugin cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Boolean.
    Checkbox,
    /// Free text.
    Text,
    /// Email address.
    Email,
}

/// Per-field access rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    /// Whether ordinary update calls may write the field.
    pub update: bool,
}

impl Default for FieldAccess {
    fn default() -> Self {
        Self { update: true }
    }
}

/// Admin description shown beneath a field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDescription {
    /// No description.
    #[default]
    None,
    /// A fixed string.
    Static(String),
    /// Derived from the value of the migration flag.
    MigrationState,
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Admin label.
    #[serde(default)]
    pub label: Option<String>,
    /// Hidden fields are only returned when a read asks for them.
    #[serde(default)]
    pub hidden: bool,
    /// Access rules.
    #[serde(default)]
    pub access: FieldAccess,
    /// Admin description.
    #[serde(default)]
    pub description: FieldDescription,
}

impl FieldConfig {
    /// Description text for a field currently holding `value`.
    #[must_use]
    pub fn describe(&self, value: Option<bool>) -> &str {
        match &self.description {
            FieldDescription::None => "",
            FieldDescription::Static(text) => text.as_str(),
            FieldDescription::MigrationState => DisplayState::from(value).description(),
        }
    }
}

/// A custom HTTP endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route path.
    pub path: String,
    /// HTTP method, lowercase.
    pub method: String,
    /// Mounted at the server root instead of under the API prefix.
    #[serde(default)]
    pub root: bool,
    /// Name of the handler to run.
    pub handler: String,
}

/// Admin UI configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Components rendered after the login form.
    #[serde(default)]
    pub after_login: Vec<String>,
}

/// Extends `base` with the plugin's fields, endpoints and components.
///
/// Only collections with `auth` enabled gain fields. Existing entries are kept
/// in front; entries the plugin already added are not added again.
#[must_use]
pub fn transform(mut base: HostConfig, settings: &PluginSettings, side: PluginSide) -> HostConfig {
    for collection in base.collections.iter_mut().filter(|c| c.auth) {
        for field in migration_fields(settings) {
            if collection.field(&field.name).is_none() {
                collection.fields.push(field);
            }
        }
    }

    match side {
        PluginSide::Server => {
            let route = settings.login_route();
            for handler in [JSON_BODY_HANDLER, MIGRATION_GATE_HANDLER] {
                let endpoint = EndpointConfig {
                    path: route.clone(),
                    method: "post".into(),
                    root: true,
                    handler: handler.into(),
                };
                if !base.endpoints.contains(&endpoint) {
                    base.endpoints.push(endpoint);
                }
            }
        }
        PluginSide::Client => {
            let after_login = &mut base.admin.after_login;
            if !after_login.iter().any(|c| c == LOGIN_INTERCEPTOR_COMPONENT) {
                after_login.push(LOGIN_INTERCEPTOR_COMPONENT.into());
            }
        }
    }

    base
}

fn migration_fields(settings: &PluginSettings) -> [FieldConfig; 2] {
    [
        FieldConfig {
            name: settings.migrate_field.clone(),
            kind: FieldKind::Checkbox,
            label: Some("Migrate password from Wordpress".into()),
            hidden: false,
            access: FieldAccess { update: false },
            description: FieldDescription::MigrationState,
        },
        FieldConfig {
            name: settings.hash_field.clone(),
            kind: FieldKind::Text,
            label: Some("Password migrated from Wordpress".into()),
            hidden: true,
            access: FieldAccess { update: false },
            description: FieldDescription::None,
        },
    ]
}

#[cfg(test)]
mod test {
    use super::{
        transform, CollectionConfig, EndpointConfig, FieldConfig, FieldKind, HostConfig,
        PluginSide, LOGIN_INTERCEPTOR_COMPONENT, MIGRATION_GATE_HANDLER,
    };
    use crate::config::PluginSettings;

    fn base() -> HostConfig {
        HostConfig {
            collections: vec![
                CollectionConfig {
                    slug: "users".into(),
                    auth: true,
                    fields: vec![FieldConfig {
                        name: "email".into(),
                        kind: FieldKind::Email,
                        label: None,
                        hidden: false,
                        access: Default::default(),
                        description: Default::default(),
                    }],
                },
                CollectionConfig {
                    slug: "posts".into(),
                    auth: false,
                    fields: Vec::new(),
                },
            ],
            endpoints: vec![EndpointConfig {
                path: "/health".into(),
                method: "get".into(),
                root: true,
                handler: "health".into(),
            }],
            admin: Default::default(),
        }
    }

    #[test]
    fn only_auth_collections_gain_fields() {
        let settings = PluginSettings::default();
        let config = transform(base(), &settings, PluginSide::Server);

        let users = config.collection("users").unwrap();
        let names: Vec<_> = users.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["email", "wordpressPasswordMigrate", "wordpressPasswordHash"]
        );

        let flag = users.field("wordpressPasswordMigrate").unwrap();
        assert_eq!(flag.kind, FieldKind::Checkbox);
        assert!(!flag.access.update);
        assert!(!flag.hidden);
        assert_eq!(flag.describe(Some(false)), "The password has been migrated.");
        assert_eq!(flag.describe(None), "");

        let hash = users.field("wordpressPasswordHash").unwrap();
        assert!(hash.hidden);
        assert!(!hash.access.update);

        assert!(config.collection("posts").unwrap().fields.is_empty());
    }

    #[test]
    fn server_side_registers_login_endpoints_after_existing_ones() {
        let config = transform(base(), &PluginSettings::default(), PluginSide::Server);

        let handlers: Vec<_> = config.endpoints.iter().map(|e| e.handler.as_str()).collect();
        assert_eq!(handlers, ["health", "json-body", MIGRATION_GATE_HANDLER]);
        assert!(config.endpoints[1..]
            .iter()
            .all(|e| e.path == "/api/:collection/login" && e.method == "post" && e.root));
        assert!(config.admin.after_login.is_empty());
    }

    #[test]
    fn client_side_registers_the_interceptor() {
        let config = transform(base(), &PluginSettings::default(), PluginSide::Client);
        assert_eq!(config.admin.after_login, [LOGIN_INTERCEPTOR_COMPONENT]);
        assert_eq!(config.endpoints.len(), 1);
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let settings = PluginSettings::default();
        let once = transform(base(), &settings, PluginSide::Server);
        let twice = transform(once.clone(), &settings, PluginSide::Server);
        assert_eq!(once, twice);
    }

    #[test]
    fn host_config_deserializes_from_json() {
        let config: HostConfig = serde_json::from_str(
            r#"{
                "collections": [
                    { "slug": "users", "auth": true,
                      "fields": [{ "name": "email", "type": "email" }] }
                ]
            }"#,
        )
        .unwrap();

        let users = config.collection("users").unwrap();
        assert!(users.auth);
        assert!(users.field("email").unwrap().access.update);
    }
}
