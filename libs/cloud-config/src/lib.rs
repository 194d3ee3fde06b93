//! Cloud credential document library.
//!
//! Implements the multi-profile `clouds.yaml` format that carries provider
//! API credentials. A document names one or more cloud profiles; each
//! profile holds an auth section plus connection options such as the
//! region, the service catalog interface, and TLS trust settings.
//!
//! # Format
//!
//! ```text
//! clouds:
//!   production:
//!     auth:
//!       auth_url: https://identity.example.com:5000/v3
//!       username: svc-hibernate
//!       password: hunter2
//!       project_name: cluster-infra
//!       user_domain_name: Default
//!       project_domain_name: Default
//!     region_name: RegionOne
//!     interface: public
//! ```
//!
//! Unknown keys are tolerated so documents written for other consumers
//! parse cleanly. The `cacert` field carries inline PEM content, not a
//! file path; callers inject trust material with
//! [`CloudProfile::set_trust_bundle`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service catalog interface used when a profile does not set one.
pub const DEFAULT_INTERFACE: &str = "public";

/// Cloud config errors.
#[derive(Debug, Error)]
pub enum CloudConfigError {
    /// Document is not valid YAML or has the wrong shape.
    #[error("invalid clouds document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Requested cloud is not present in the document.
    #[error("cloud '{cloud}' not found in document (available: {available})")]
    UnknownCloud { cloud: String, available: String },

    /// Profile has no auth section at all.
    #[error("cloud '{cloud}' has no auth section")]
    NoAuth { cloud: String },

    /// Profile auth section is missing a required field.
    #[error("cloud '{cloud}' is missing required auth field '{field}'")]
    MissingField { cloud: String, field: &'static str },
}

/// A multi-profile clouds document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudsDocument {
    /// Profiles by cloud name.
    #[serde(default)]
    pub clouds: BTreeMap<String, CloudProfile>,
}

impl CloudsDocument {
    /// Parse a document from raw YAML bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, CloudConfigError> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Look up a profile by cloud name.
    ///
    /// The error lists the clouds the document does define, since a
    /// mismatched cloud name is the most common operator mistake.
    pub fn profile(&self, cloud: &str) -> Result<&CloudProfile, CloudConfigError> {
        self.clouds
            .get(cloud)
            .ok_or_else(|| CloudConfigError::UnknownCloud {
                cloud: cloud.to_string(),
                available: self
                    .clouds
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, CloudConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// A single named cloud profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudProfile {
    /// Authentication parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSection>,

    /// Region to resolve service endpoints in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,

    /// Service catalog interface (public, internal, admin).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Additional trusted CA certificates as inline PEM content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacert: Option<String>,

    /// Whether to verify server TLS certificates. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,

    /// Auth plugin name, e.g. `password` or `v3applicationcredential`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
}

impl CloudProfile {
    /// Catalog interface, falling back to [`DEFAULT_INTERFACE`].
    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_INTERFACE)
    }

    /// Whether server TLS certificates should be verified.
    pub fn verify_tls(&self) -> bool {
        self.verify.unwrap_or(true)
    }

    /// Replace the profile's trusted CA material with `pem`.
    ///
    /// The content overwrites any `cacert` the document shipped with;
    /// operator-supplied trust bundles take precedence.
    pub fn set_trust_bundle(&mut self, pem: impl Into<String>) {
        self.cacert = Some(pem.into());
    }

    /// Validate the auth section and extract the fields a token request
    /// needs. `cloud` is only used in error messages.
    pub fn validated_auth(&self, cloud: &str) -> Result<ValidatedAuth, CloudConfigError> {
        let auth = self.auth.as_ref().ok_or_else(|| CloudConfigError::NoAuth {
            cloud: cloud.to_string(),
        })?;

        let auth_url = require(cloud, "auth_url", &auth.auth_url)?;

        let method = match (&auth.application_credential_id, &auth.application_credential_secret)
        {
            (Some(id), Some(secret)) => AuthMethod::ApplicationCredential {
                id: id.clone(),
                secret: secret.clone(),
            },
            (Some(_), None) => {
                return Err(CloudConfigError::MissingField {
                    cloud: cloud.to_string(),
                    field: "application_credential_secret",
                })
            }
            (None, Some(_)) => {
                return Err(CloudConfigError::MissingField {
                    cloud: cloud.to_string(),
                    field: "application_credential_id",
                })
            }
            (None, None) => AuthMethod::Password {
                username: require(cloud, "username", &auth.username)?,
                password: require(cloud, "password", &auth.password)?,
                user_domain_name: auth.user_domain_name.clone(),
            },
        };

        Ok(ValidatedAuth {
            auth_url,
            method,
            project_name: auth.project_name.clone(),
            project_id: auth.project_id.clone(),
            project_domain_name: auth.project_domain_name.clone(),
        })
    }
}

fn require(
    cloud: &str,
    field: &'static str,
    value: &Option<String>,
) -> Result<String, CloudConfigError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CloudConfigError::MissingField {
            cloud: cloud.to_string(),
            field,
        }),
    }
}

/// Raw auth parameters as they appear in the document.
///
/// Everything is optional at parse time; [`CloudProfile::validated_auth`]
/// enforces which combinations are usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_domain_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_domain_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credential_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credential_secret: Option<String>,
}

/// Auth parameters with required fields resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAuth {
    /// Identity endpoint, e.g. `https://identity.example.com:5000/v3`.
    pub auth_url: String,

    /// Credential to authenticate with.
    pub method: AuthMethod,

    /// Project to scope the token to, by name.
    pub project_name: Option<String>,

    /// Project to scope the token to, by id. Used when no name is set.
    pub project_id: Option<String>,

    /// Domain the scoped project lives in.
    pub project_domain_name: Option<String>,
}

/// Supported identity auth methods.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    /// Username and password, optionally qualified by a user domain.
    Password {
        username: String,
        password: String,
        user_domain_name: Option<String>,
    },

    /// Pre-issued application credential.
    ApplicationCredential { id: String, secret: String },
}
