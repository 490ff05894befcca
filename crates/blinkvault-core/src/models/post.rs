use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::user::id_set;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostAuthor {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub username: Option<String>,
    #[serde(rename = "profilePic", default)]
    pub profile_pic_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorWire {
    Id(String),
    Populated(PostAuthor),
}

fn author<'de, D>(deserializer: D) -> Result<Option<PostAuthor>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire: Option<AuthorWire> = Option::deserialize(deserializer)?;
    Ok(wire.map(|w| match w {
        AuthorWire::Id(id) => PostAuthor {
            id,
            ..PostAuthor::default()
        },
        AuthorWire::Populated(author) => author,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "user", default, deserialize_with = "author")]
    pub author: Option<PostAuthor>,
    #[serde(default, deserialize_with = "id_set")]
    pub likes: HashSet<String>,
    #[serde(default, deserialize_with = "id_set")]
    pub dislikes: HashSet<String>,
    #[serde(rename = "commentsCount")]
    pub comments_count: Option<u64>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|a| a.username.as_deref())
            .unwrap_or("unknown")
    }

    /// Likes minus dislikes.
    pub fn score(&self) -> i64 {
        self.likes.len() as i64 - self.dislikes.len() as i64
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author.as_ref().map(|a| a.id == user_id).unwrap_or(false)
    }
}

/// The home feed: two independently ranked lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub trending: Vec<Post>,
    #[serde(default)]
    pub latest: Vec<Post>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedTab {
    Trending,
    Latest,
}

impl Feed {
    pub fn tab(&self, tab: FeedTab) -> &[Post] {
        match tab {
            FeedTab::Trending => &self.trending,
            FeedTab::Latest => &self.latest,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "user", default, deserialize_with = "author")]
    pub author: Option<PostAuthor>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentsResponse {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SavedResponse {
    #[serde(default)]
    pub saved: Vec<Post>,
}
