//! Authenticated principals and the authorities derived from them.

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Claim carrying the principal's role.
pub const ROLE_CLAIM: &str = "role";

/// Identity established by a successfully verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    /// Stable subject identifier issued by the identity provider.
    pub subject: String,
    /// Email address, if the provider supplied one.
    pub email: Option<String>,
    /// Whether the provider vouches for the email address.
    pub email_verified: bool,
    /// Every claim in the verified token.
    #[serde(skip)]
    pub claims: Map<String, Value>,
}

impl Principal {
    /// Creates a principal with no email and no extra claims.
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), email: None, email_verified: false, claims: Map::new() }
    }

    /// Sets the email address and its verification flag.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = verified;
        self
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Resolves the principal's role from its claims.
    ///
    /// A missing claim means [`Role::User`]. A present claim must be a
    /// string naming a known role.
    pub fn role(&self) -> Result<Role, RoleError> {
        match self.claims.get(ROLE_CLAIM) {
            None => Ok(Role::User),
            Some(Value::String(name)) => name.parse(),
            Some(other) => Err(RoleError::NotAString { found: json_kind(other) }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Role claim could not be mapped to a known role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Role name is not in the known set.
    #[error("unrecognized role '{0}'")]
    Unrecognized(String),

    /// Role claim is present but not a string.
    #[error("role claim must be a string, found {found}")]
    NotAString {
        /// JSON type of the claim value.
        found: &'static str,
    },
}

/// Closed set of roles a principal may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Regular user.
    User,
    /// Administrator.
    Admin,
}

impl Role {
    /// Authority granted by this role.
    pub fn authority(self) -> Authority {
        Authority(self)
    }

    /// Upper-case role name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, RoleError> {
        if s.eq_ignore_ascii_case("user") {
            Ok(Self::User)
        } else if s.eq_ignore_ascii_case("admin") {
            Ok(Self::Admin)
        } else {
            Err(RoleError::Unrecognized(s.to_string()))
        }
    }
}

/// Authority tag of the form `ROLE_<NAME>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Authority(Role);

impl Authority {
    /// Tag string, e.g. `ROLE_ADMIN`.
    pub fn as_str(self) -> &'static str {
        match self.0 {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }

    /// Role behind the tag.
    pub fn role(self) -> Role {
        self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Authority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Per-request authentication context attached by the authentication stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authentication {
    /// Verified principal.
    #[serde(flatten)]
    pub principal: Principal,
    /// Authorities derived from the principal's claims.
    pub authorities: Vec<Authority>,
}

impl Authentication {
    /// Derives authorities from the principal's role claim.
    pub fn from_principal(principal: Principal) -> Result<Self, RoleError> {
        let role = principal.role()?;
        Ok(Self { principal, authorities: vec![role.authority()] })
    }

    /// Subject identifier of the principal.
    pub fn subject(&self) -> &str {
        &self.principal.subject
    }

    /// Returns true when the principal holds the role.
    pub fn has_role(&self, role: Role) -> bool {
        self.authorities.iter().any(|authority| authority.role() == role)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_role_claim_grants_user() {
        let auth = Authentication::from_principal(Principal::new("uid-1")).unwrap();

        assert_eq!(auth.authorities, vec![Role::User.authority()]);
        assert_eq!(auth.authorities[0].as_str(), "ROLE_USER");
        assert!(auth.has_role(Role::User));
        assert!(!auth.has_role(Role::Admin));
    }

    #[test]
    fn role_claim_is_case_insensitive() {
        let principal = Principal::new("uid-1").with_claim(ROLE_CLAIM, "Admin");
        let auth = Authentication::from_principal(principal).unwrap();

        assert_eq!(auth.authorities[0].to_string(), "ROLE_ADMIN");
    }

    #[test]
    fn unknown_role_is_an_error() {
        let principal = Principal::new("uid-1").with_claim(ROLE_CLAIM, "superuser");

        assert_eq!(
            Authentication::from_principal(principal),
            Err(RoleError::Unrecognized("superuser".to_string()))
        );
    }

    #[test]
    fn non_string_role_is_an_error() {
        let principal = Principal::new("uid-1").with_claim(ROLE_CLAIM, json!(["admin"]));

        assert_eq!(principal.role(), Err(RoleError::NotAString { found: "array" }));
    }

    #[test]
    fn authentication_serializes_flat() {
        let principal = Principal::new("uid-1")
            .with_email("ada@example.com", true)
            .with_claim(ROLE_CLAIM, "admin");
        let auth = Authentication::from_principal(principal).unwrap();

        assert_eq!(
            serde_json::to_value(&auth).unwrap(),
            json!({
                "subject": "uid-1",
                "email": "ada@example.com",
                "email_verified": true,
                "authorities": ["ROLE_ADMIN"],
            })
        );
    }
}
