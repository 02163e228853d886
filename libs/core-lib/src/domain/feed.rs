use super::timestamp::{self, Timestamp};
use crate::CoreError;
use serde::{Deserialize, Serialize};

pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comentarios";
pub const LIKES: &str = "curtidas";

pub const MAX_PAGE_SIZE: usize = 100;
const MAX_CONTENT_CHARS: usize = 5_000;

/// A user likes a post at most once.
pub fn like_id(post_id: &str, usuario_id: &str) -> String {
    format!("{}_{}", post_id, usuario_id)
}

fn validate_content(content: &str) -> Result<String, CoreError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CoreError::Validation("content cannot be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(CoreError::Validation(format!(
            "content is limited to {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(content.to_string())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub negocio_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl Post {
    pub fn new(
        negocio_id: &str,
        author_id: &str,
        content: &str,
        image_url: Option<String>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: negocio_id.to_string(),
            author_id: author_id.to_string(),
            content: validate_content(content)?,
            image_url: image_url.filter(|u| !u.trim().is_empty()),
            like_count: 0,
            comment_count: 0,
            created_at: timestamp::now(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub negocio_id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl Comment {
    pub fn new(negocio_id: &str, post_id: &str, author_id: &str, content: &str) -> Result<Self, CoreError> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: negocio_id.to_string(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            content: validate_content(content)?,
            created_at: timestamp::now(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Like {
    pub id: String,
    pub negocio_id: String,
    pub post_id: String,
    pub usuario_id: String,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl Like {
    pub fn new(negocio_id: &str, post_id: &str, usuario_id: &str) -> Self {
        Self {
            id: like_id(post_id, usuario_id),
            negocio_id: negocio_id.to_string(),
            post_id: post_id.to_string(),
            usuario_id: usuario_id.to_string(),
            created_at: timestamp::now(),
        }
    }
}

/// Clamp a requested page size to `1..=MAX_PAGE_SIZE`, defaulting to 20.
pub fn page_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(20).clamp(1, MAX_PAGE_SIZE)
}
