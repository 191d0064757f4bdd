//! Core identity types.
//!
//! A [`Credential`] is what a successful login produces and what every
//! authenticated command reads back. The token is an opaque bearer credential
//! issued by the cmdref backend, not a provider token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Filled in by the session store when the credential is first persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: email.into(),
            name: name.into(),
            picture: None,
            created_at: None,
        }
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// A credential is only usable when it carries a token.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Best human-readable identity: email, then name.
    pub fn display_identity(&self) -> &str {
        if !self.email.is_empty() {
            &self.email
        } else if !self.name.is_empty() {
            &self.name
        } else {
            "unknown user"
        }
    }
}
