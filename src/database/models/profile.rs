use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::User;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(format!("unknown role '{}', expected 'admin' or 'user'", other)),
        }
    }
}

/// Application-level user record, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Full name when present, else the email address.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileInsert {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
}

impl ProfileInsert {
    /// Default profile for a freshly authenticated identity. `None` when the
    /// provider reported no email, which the profiles table requires.
    pub fn for_user(user: &User) -> Option<Self> {
        let email = user.email.clone().filter(|e| !e.trim().is_empty())?;
        Some(Self {
            id: user.id,
            email,
            full_name: user.user_metadata.full_name.clone(),
            role: UserRole::User,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileUpdate {
    pub fn role(role: UserRole) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserMetadata;
    use serde_json::json;

    #[test]
    fn insert_for_user_takes_metadata_name() {
        let user = User {
            id: Uuid::new_v4(),
            email: Some("ana@example.com".into()),
            user_metadata: UserMetadata::with_full_name(Some("Ana Ruiz".into())),
        };
        let insert = ProfileInsert::for_user(&user).unwrap();
        assert_eq!(insert.id, user.id);
        assert_eq!(insert.full_name.as_deref(), Some("Ana Ruiz"));
        assert_eq!(insert.role, UserRole::User);
    }

    #[test]
    fn insert_requires_email() {
        let user = User {
            id: Uuid::new_v4(),
            email: None,
            user_metadata: UserMetadata::default(),
        };
        assert!(ProfileInsert::for_user(&user).is_none());
    }

    #[test]
    fn update_omits_absent_fields() {
        let patch = serde_json::to_value(ProfileUpdate::role(UserRole::Admin)).unwrap();
        assert_eq!(patch, json!({"role": "admin"}));

        let cleared = ProfileUpdate {
            full_name: Some(None),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(cleared).unwrap(), json!({"full_name": null}));
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(serde_json::from_value::<UserRole>(json!("owner")).is_err());
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
    }
}
