use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo::User;

/// Request body for user registration. Email is optional; a placeholder
/// address is synthesized from the username when omitted.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

/// Request body for login. `identifier` is a username or an email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
}

/// Response for the identity probe; `user` is null when unauthenticated.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<PublicUser>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Login identifier, tagged once at the API boundary instead of re-checking
/// the string shape at each call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Username(String),
}

impl Identifier {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if normalized.contains('@') {
            Self::Email(normalized)
        } else {
            Self::Username(normalized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_tags_emails() {
        assert_eq!(
            Identifier::parse("  Bob@Example.COM "),
            Identifier::Email("bob@example.com".into())
        );
    }

    #[test]
    fn identifier_tags_usernames() {
        assert_eq!(
            Identifier::parse("  Bob99 "),
            Identifier::Username("bob99".into())
        );
    }
}
