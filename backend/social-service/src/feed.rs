//! Post feed: the posts snapshot plus like, comment, share, delete and poll
//! votes.
//!
//! Snapshot lookups decide what to write (like vs unlike, who may delete),
//! then the write goes to the store and, once it lands, to the local copy.

use crate::domain::models::{Comment, Poll, Post, DEFAULT_DISPLAY_NAME};
use crate::error::{ServiceError, ServiceResult};
use crate::mapping;
use crate::polls;
use chrono::Utc;
use document_store::{Collection, Document, DocumentStore, Patch, Query};
use identity_core::{IdentityProvider, UserId, Viewer};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Feed {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    posts: RwLock<Vec<Post>>,
}

/// Newest first; posts still waiting on a server timestamp sort on top
fn newest_first(a: &Post, b: &Post) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn require_text(text: &str, what: &str) -> ServiceResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn author_name(viewer: &Viewer) -> &str {
    if viewer.display_name.trim().is_empty() {
        DEFAULT_DISPLAY_NAME
    } else {
        &viewer.display_name
    }
}

impl Feed {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            posts: RwLock::new(Vec::new()),
        }
    }

    /// Live query for the whole feed, newest first
    pub fn watch_query() -> Query {
        Query::collection(Collection::Posts).order_by("createdAt", true)
    }

    fn read_posts(&self) -> RwLockReadGuard<'_, Vec<Post>> {
        self.posts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_posts(&self) -> RwLockWriteGuard<'_, Vec<Post>> {
        self.posts.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the local snapshot. Malformed posts are skipped.
    pub fn apply_snapshot(&self, documents: &[Document]) -> usize {
        let mut next: Vec<Post> = documents
            .iter()
            .filter_map(|doc| match mapping::post_from_document(doc) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(post_id = %doc.id, error = %e, "Skipping malformed post document");
                    None
                }
            })
            .collect();
        next.sort_by(newest_first);

        let kept = next.len();
        *self.write_posts() = next;
        debug!(posts = kept, "Feed snapshot applied");
        kept
    }

    pub async fn refresh(&self) -> ServiceResult<usize> {
        let docs = self.store.query(&Self::watch_query()).await?;
        Ok(self.apply_snapshot(&docs))
    }

    pub fn posts(&self) -> Vec<Post> {
        self.read_posts().clone()
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.read_posts().iter().find(|post| post.id == post_id).cloned()
    }

    pub fn user_posts(&self, author: &UserId) -> Vec<Post> {
        self.read_posts()
            .iter()
            .filter(|post| post.author_id == *author)
            .cloned()
            .collect()
    }

    pub fn is_liked_by_viewer(&self, post: &Post) -> bool {
        self.identity
            .current_viewer_id()
            .is_some_and(|viewer| post.is_liked_by(&viewer))
    }

    fn snapshot_post(&self, post_id: &str) -> ServiceResult<Post> {
        self.post(post_id)
            .ok_or_else(|| ServiceError::NotFound(format!("post {post_id}")))
    }

    fn update_local<F>(&self, post_id: &str, edit: F)
    where
        F: FnOnce(&mut Post),
    {
        if let Some(post) = self.write_posts().iter_mut().find(|post| post.id == post_id) {
            edit(post);
        }
    }

    /// Publish a post as the viewer. Returns the new post id.
    ///
    /// The author headline comes from the viewer's stored profile.
    pub async fn create_post(&self, content: &str, poll: Option<Poll>) -> ServiceResult<String> {
        let viewer = self.identity.require_viewer()?;
        let content = require_text(content, "post content")?;

        let headline = self
            .store
            .get(Collection::Users, viewer.id.as_str())
            .await?
            .and_then(|doc| doc.get_str("headline").map(str::to_string))
            .unwrap_or_default();

        let mut patch = Patch::new()
            .set("content", content.as_str())
            .set("authorId", viewer.id.as_str())
            .set("authorName", author_name(&viewer))
            .set("authorHeadline", headline.as_str())
            .set("likes", json!([]))
            .set("comments", json!([]))
            .set("shares", 0)
            .server_timestamp("createdAt");
        if let Some(avatar) = &viewer.profile_picture {
            patch = patch.set("authorAvatar", avatar.as_str());
        }
        if let Some(poll) = &poll {
            patch = patch.set_serialized("poll", poll)?;
        }

        debug!(user_id = %viewer.id, has_poll = poll.is_some(), "Creating post");
        let post_id = self.store.add(Collection::Posts, patch).await?;

        // No timestamp until the server copy arrives, so it sorts on top
        let post = Post {
            id: post_id.clone(),
            author_name: author_name(&viewer).to_string(),
            author_id: viewer.id.clone(),
            author_avatar: viewer.profile_picture.clone(),
            author_headline: Some(headline),
            content,
            likes: Vec::new(),
            comments: Vec::new(),
            shares: 0,
            poll,
            created_at: None,
        };
        self.write_posts().insert(0, post);

        info!(post_id = %post_id, user_id = %viewer.id, "Post created");
        Ok(post_id)
    }

    /// Like or unlike depending on the snapshot. Returns whether the viewer
    /// now likes the post.
    pub async fn toggle_like(&self, post_id: &str) -> ServiceResult<bool> {
        let viewer = self.identity.require_viewer()?.id;
        let post = self.snapshot_post(post_id)?;

        let liked = post.is_liked_by(&viewer);
        let value = vec![Value::String(viewer.as_str().to_string())];
        let patch = if liked {
            Patch::new().array_remove("likes", value)
        } else {
            Patch::new().array_union("likes", value)
        };

        debug!(post_id, user_id = %viewer, liked, "Toggling like");
        self.store.update(Collection::Posts, post_id, patch).await?;

        self.update_local(post_id, |post| {
            if liked {
                post.likes.retain(|id| *id != viewer);
            } else if !post.likes.contains(&viewer) {
                post.likes.push(viewer.clone());
            }
        });
        Ok(!liked)
    }

    pub async fn add_comment(&self, post_id: &str, content: &str) -> ServiceResult<Comment> {
        let viewer = self.identity.require_viewer()?;
        let content = require_text(content, "comment")?;
        self.snapshot_post(post_id)?;

        let comment = Comment {
            id: Uuid::new_v4().simple().to_string(),
            content,
            author_id: viewer.id.clone(),
            author_name: author_name(&viewer).to_string(),
            author_avatar: viewer.profile_picture.clone(),
            created_at: Some(Utc::now()),
        };
        let patch = Patch::new().array_union("comments", vec![serde_json::to_value(&comment)?]);

        self.store.update(Collection::Posts, post_id, patch).await?;
        self.update_local(post_id, |post| post.comments.push(comment.clone()));
        info!(post_id, comment_id = %comment.id, user_id = %viewer.id, "Comment added");
        Ok(comment)
    }

    pub async fn share_post(&self, post_id: &str) -> ServiceResult<()> {
        let viewer = self.identity.require_viewer()?.id;
        self.snapshot_post(post_id)?;

        self.store
            .update(Collection::Posts, post_id, Patch::new().increment("shares", 1))
            .await?;
        self.update_local(post_id, |post| post.shares += 1);
        debug!(post_id, user_id = %viewer, "Post shared");
        Ok(())
    }

    /// Hard delete; only the author may do it
    pub async fn delete_post(&self, post_id: &str) -> ServiceResult<()> {
        let viewer = self.identity.require_viewer()?.id;
        let post = self.snapshot_post(post_id)?;

        if post.author_id != viewer {
            warn!(post_id, user_id = %viewer, author_id = %post.author_id, "Rejected delete by non-author");
            return Err(ServiceError::Forbidden(format!(
                "post {post_id} belongs to another user"
            )));
        }

        self.store.delete(Collection::Posts, post_id).await?;
        self.write_posts().retain(|post| post.id != post_id);
        info!(post_id, user_id = %viewer, "Post deleted");
        Ok(())
    }

    /// Move the viewer's vote to `option_id`, writing the whole poll back
    pub async fn vote_on_poll(&self, post_id: &str, option_id: &str) -> ServiceResult<()> {
        let viewer = self.identity.require_viewer()?.id;
        self.rewrite_poll(post_id, |poll| polls::vote(poll, option_id, Some(&viewer)))
            .await
    }

    pub async fn retract_poll_vote(&self, post_id: &str) -> ServiceResult<()> {
        let viewer = self.identity.require_viewer()?.id;
        self.rewrite_poll(post_id, |poll| polls::retract_vote(poll, Some(&viewer)))
            .await
    }

    async fn rewrite_poll<F>(&self, post_id: &str, edit: F) -> ServiceResult<()>
    where
        F: FnOnce(&mut Poll) -> ServiceResult<bool>,
    {
        let post = self.snapshot_post(post_id)?;
        let Some(mut poll) = post.poll else {
            return Err(ServiceError::InvalidInput(format!("post {post_id} has no poll")));
        };

        if !edit(&mut poll)? {
            debug!(post_id, "Poll unchanged, skipping write");
            return Ok(());
        }

        let patch = Patch::new().set_serialized("poll", &poll)?;
        self.store.update(Collection::Posts, post_id, patch).await?;
        info!(post_id, total_votes = polls::total_votes(&poll), "Poll updated");
        self.update_local(post_id, |post| post.poll = Some(poll));
        Ok(())
    }
}
