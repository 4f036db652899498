use crate::error::ForumError;
use async_trait::async_trait;
use std::collections::VecDeque;

mod reddit;
pub use reddit::{RedditClient, RedditCredentials};

/// A post as listed by the forum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn new(id: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            body: body.to_string(),
            replies: Vec::new(),
        }
    }

    pub fn with_replies(mut self, replies: Vec<Comment>) -> Self {
        self.replies = replies;
        self
    }
}

/// Top-level comments of a post, in the forum's ranked order, with whatever
/// replies the forum returned inline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommentForest {
    pub comments: Vec<Comment>,
}

impl CommentForest {
    /// Breadth-first walk: every top-level comment first, then their replies
    /// level by level.
    pub fn flatten(&self) -> Vec<&Comment> {
        let mut flat = Vec::new();
        let mut queue: VecDeque<&Comment> = self.comments.iter().collect();

        while let Some(comment) = queue.pop_front() {
            flat.push(comment);
            queue.extend(comment.replies.iter());
        }

        flat
    }
}

/// Read-only access to a forum.
#[async_trait]
pub trait ForumClient {
    /// Up to `limit` posts of `community` in "hot" order.
    async fn hot_posts(&self, community: &str, limit: usize)
    -> Result<Vec<Submission>, ForumError>;

    /// The comment tree of a post. Placeholders for comments that need
    /// further requests are dropped.
    async fn comment_tree(&self, submission: &Submission) -> Result<CommentForest, ForumError>;
}
