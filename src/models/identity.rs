use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Id;

/// Access tier of a signed-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Holder,
    /// Unprivileged default. Unknown role strings land here too.
    #[serde(other)]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Holder => "holder",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            "holder" => Role::Holder,
            _ => Role::User,
        })
    }
}

/// Who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: Id,
    pub role: Role,
}

impl Identity {
    pub fn new(account_id: impl Into<Id>, role: Role) -> Self {
        Self {
            account_id: account_id.into(),
            role,
        }
    }
}

/// Profile row kept by the backend for every auth account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Profile {
    pub fn new(id: impl Into<Id>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: None,
            full_name: None,
            role: Some(role),
        }
    }

    /// Role with the unprivileged default applied.
    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or(Role::User)
    }
}
