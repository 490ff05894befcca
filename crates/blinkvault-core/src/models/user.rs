use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// A reference to another record: the API sends either the bare id or a
/// populated object carrying `_id`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRef {
    Id(String),
    Object {
        #[serde(rename = "_id", alias = "id")]
        id: String,
    },
}

impl IdRef {
    fn into_id(self) -> String {
        match self {
            IdRef::Id(id) | IdRef::Object { id } => id,
        }
    }
}

/// Decode a possibly-missing, possibly-null array of id references into a set.
pub(crate) fn id_set<'de, D>(deserializer: D) -> Result<HashSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let refs: Option<Vec<IdRef>> = Option::deserialize(deserializer)?;
    Ok(refs
        .unwrap_or_default()
        .into_iter()
        .map(IdRef::into_id)
        .collect())
}

/// The signed-in user as held by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "profilePic", alias = "profilePicUrl", default)]
    pub profile_pic_url: Option<String>,
    #[serde(rename = "following", default, deserialize_with = "id_set")]
    pub following_ids: HashSet<String>,
    #[serde(rename = "blockedUsers", default, deserialize_with = "id_set")]
    pub blocked_user_ids: HashSet<String>,
    #[serde(rename = "savedPosts", default, deserialize_with = "id_set")]
    pub saved_post_ids: HashSet<String>,
}

impl UserSummary {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            profile_pic_url: None,
            following_ids: HashSet::new(),
            blocked_user_ids: HashSet::new(),
            saved_post_ids: HashSet::new(),
        }
    }

    /// A record is only usable as an identity when it carries a non-empty id.
    pub fn has_identity(&self) -> bool {
        !self.id.trim().is_empty()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_following(&self, user_id: &str) -> bool {
        self.following_ids.contains(user_id)
    }

    pub fn has_blocked(&self, user_id: &str) -> bool {
        self.blocked_user_ids.contains(user_id)
    }

    pub fn has_saved(&self, post_id: &str) -> bool {
        self.saved_post_ids.contains(post_id)
    }

    /// Flip membership of `id` in `set`, returning whether it is now present.
    pub(crate) fn toggle(set: &mut HashSet<String>, id: &str) -> bool {
        if set.remove(id) {
            false
        } else {
            set.insert(id.to_string());
            true
        }
    }
}

/// Another user's public profile, as returned by `GET /users/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    #[serde(rename = "profilePic", default)]
    pub profile_pic_url: Option<String>,
    #[serde(default, deserialize_with = "id_set")]
    pub followers: HashSet<String>,
    #[serde(default, deserialize_with = "id_set")]
    pub following: HashSet<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Compact user entry used in follower/following/blocked lists and admin tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListEntry {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    pub name: Option<String>,
    #[serde(rename = "profilePic", default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "isBanned", default)]
    pub is_banned: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeResponse {
    pub user: Option<UserSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileResponse {
    pub user: UserProfile,
    #[serde(default)]
    pub posts: Vec<crate::models::Post>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowersResponse {
    #[serde(default)]
    pub followers: Vec<UserListEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowingResponse {
    #[serde(default)]
    pub following: Vec<UserListEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockedResponse {
    #[serde(default)]
    pub blocked: Vec<UserListEntry>,
}

/// Result of `POST /auth/check-username`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameAvailability {
    pub available: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Body of every successful authentication exchange.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthGrant {
    pub user: UserSummary,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}
