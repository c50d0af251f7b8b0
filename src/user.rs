//! User records, the summaries embedded in task views, and the acting identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields::{Department, Role};

pub type UserId = Uuid;

/// A stored account. The password hash never leaves the store; outputs use
/// [`UserSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<Department>,
}

/// Public projection of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<Department>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        UserSummary {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            department: u.department,
        }
    }
}

/// The verified caller of an operation, as recovered from an identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    pub department: Option<Department>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl Identity {
    /// True when the identity has a department and it equals `dept`.
    pub fn in_department(&self, dept: Department) -> bool {
        self.department == Some(dept)
    }
}

impl From<&User> for Identity {
    fn from(u: &User) -> Self {
        Identity {
            id: u.id,
            role: u.role,
            department: u.department,
            email: u.email.clone(),
            name: u.name.clone(),
        }
    }
}

/// Trim and lower-case an email address for storage and lookup.
pub fn normalise_email(s: &str) -> String {
    s.trim().to_lowercase()
}
