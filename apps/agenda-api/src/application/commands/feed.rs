use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::middleware::AuthenticatedUser;
use crate::application::{decode_all, fetch};
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use core_lib::domain::feed::{COMMENTS, Comment, LIKES, Like, POSTS, Post, like_id};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, Query, Transaction, document::encode,
    run_in_transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub actor: String,
    pub negocio_id: String,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeletePost {
    pub actor: String,
    pub actor_is_admin: bool,
    pub negocio_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone)]
pub struct AddComment {
    pub actor: String,
    pub negocio_id: String,
    pub post_id: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ToggleLike {
    pub actor: String,
    pub negocio_id: String,
    pub post_id: String,
}

impl Command for CreatePost {}
impl Command for DeletePost {}
impl Command for AddComment {}
impl Command for ToggleLike {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: u64,
}

pub struct FeedHandler {
    store: Arc<dyn DocumentStore>,
}

impl FeedHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

async fn post_in_tenant(
    tx: &mut dyn Transaction,
    negocio_id: &str,
    post_id: &str,
) -> Result<Post, CoreError> {
    fetch::<Post>(tx, POSTS, post_id)
        .await?
        .filter(|p| p.negocio_id == negocio_id)
        .ok_or_else(|| CoreError::NotFound("post".into()))
}

impl CommandHandler<CreatePost> for FeedHandler {
    type Output = Post;

    async fn handle(&self, command: CreatePost) -> Result<Post, CoreError> {
        let post = Post::new(
            &command.negocio_id,
            &command.actor,
            &command.content,
            command.image_url,
        )?;
        self.store.create(POSTS, &post.id, encode(&post)?).await?;
        info!(negocio_id = %post.negocio_id, post_id = %post.id, "post created");
        Ok(post)
    }
}

impl CommandHandler<DeletePost> for FeedHandler {
    type Output = ();

    async fn handle(&self, command: DeletePost) -> Result<(), CoreError> {
        let cmd = &command;
        let removed = run_in_transaction(self.store.as_ref(), "delete_post", |mut tx| async move {
            let post = post_in_tenant(tx.as_mut(), &cmd.negocio_id, &cmd.post_id).await?;
            if !cmd.actor_is_admin && post.author_id != cmd.actor {
                return Err(CoreError::Unauthorized(
                    "only the author or an admin may delete a post".into(),
                ));
            }
            // Comments and likes go with the post.
            let by_post = Query::new().where_eq("post_id", post.id.as_str());
            let mut removed = 0;
            for collection in [COMMENTS, LIKES] {
                for doc in tx.query(collection, &by_post).await? {
                    tx.delete(collection, &doc.id);
                    removed += 1;
                }
            }
            tx.delete(POSTS, &post.id);
            Ok::<_, CoreError>((tx, removed))
        })
        .await?;
        info!(post_id = %command.post_id, actor = %command.actor, dependents = removed, "post deleted");
        Ok(())
    }
}

impl CommandHandler<AddComment> for FeedHandler {
    type Output = Comment;

    async fn handle(&self, command: AddComment) -> Result<Comment, CoreError> {
        let comment = Comment::new(
            &command.negocio_id,
            &command.post_id,
            &command.actor,
            &command.content,
        )?;
        let comment_ref = &comment;
        run_in_transaction(self.store.as_ref(), "add_comment", |mut tx| async move {
            let mut post =
                post_in_tenant(tx.as_mut(), &comment_ref.negocio_id, &comment_ref.post_id).await?;
            post.comment_count += 1;
            tx.set(POSTS, &post.id, encode(&post)?);
            tx.create(COMMENTS, &comment_ref.id, encode(comment_ref)?);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;
        Ok(comment)
    }
}

impl CommandHandler<ToggleLike> for FeedHandler {
    type Output = LikeState;

    async fn handle(&self, command: ToggleLike) -> Result<LikeState, CoreError> {
        let cmd = &command;
        run_in_transaction(self.store.as_ref(), "toggle_like", |mut tx| async move {
            let mut post = post_in_tenant(tx.as_mut(), &cmd.negocio_id, &cmd.post_id).await?;
            let id = like_id(&post.id, &cmd.actor);
            let existing: Option<Like> = fetch(tx.as_mut(), LIKES, &id).await?;
            let liked = match existing {
                Some(_) => {
                    tx.delete(LIKES, &id);
                    post.like_count = post.like_count.saturating_sub(1);
                    false
                }
                None => {
                    let like = Like::new(&post.negocio_id, &post.id, &cmd.actor);
                    tx.create(LIKES, &id, encode(&like)?);
                    post.like_count += 1;
                    true
                }
            };
            tx.set(POSTS, &post.id, encode(&post)?);
            let state = LikeState {
                liked,
                like_count: post.like_count,
            };
            Ok::<_, CoreError>((tx, state))
        })
        .await
    }
}

/// Comments of a post, oldest first.
pub(crate) async fn comments_of(
    store: &dyn DocumentStore,
    post_id: &str,
) -> Result<Vec<Comment>, CoreError> {
    let docs = store
        .query(
            COMMENTS,
            &Query::new()
                .where_eq("post_id", post_id)
                .order_by("created_at", false),
        )
        .await?;
    decode_all(docs)
}

#[derive(Deserialize, Debug)]
pub struct CreatePostDto {
    content: String,
    image_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CommentDto {
    content: String,
}

// --- Axum Route Handlers ---

pub async fn handle_create_post_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    Json(payload): Json<CreatePostDto>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let post = FeedHandler::new(state.store.clone())
        .handle(CreatePost {
            actor: ctx.uid,
            negocio_id,
            content: payload.content,
            image_url: payload.image_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn handle_delete_post_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, post_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    FeedHandler::new(state.store.clone())
        .handle(DeletePost {
            actor: ctx.uid,
            actor_is_admin: access.is_admin(),
            negocio_id,
            post_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_add_comment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, post_id)): Path<(String, String)>,
    Json(payload): Json<CommentDto>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let comment = FeedHandler::new(state.store.clone())
        .handle(AddComment {
            actor: ctx.uid,
            negocio_id,
            post_id,
            content: payload.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn handle_toggle_like_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, post_id)): Path<(String, String)>,
) -> ApiResult<Json<LikeState>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let like = FeedHandler::new(state.store.clone())
        .handle(ToggleLike {
            actor: ctx.uid,
            negocio_id,
            post_id,
        })
        .await?;
    Ok(Json(like))
}
