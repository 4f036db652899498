use crate::error::ForumError;
use crate::forum::{CommentForest, ForumClient, Submission};
use agent::llm::Message;
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POST_LIMIT: usize = 7;
pub const DEFAULT_MAX_COMMENTS: Option<usize> = Some(3);

/// Comments kept per post whenever a per-post limit is requested, whatever
/// its value.
pub const COMMENT_CAP: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Post {
    pub title: String,
    pub url: String,
    pub comments: Vec<String>,
}

pub type Corpus = Vec<Post>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Pause after the `attempt`-th failure, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per post, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// One attempt, then a one minute cooldown before moving on.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
        }
    }
}

pub struct ContentScraper {
    client: Arc<dyn ForumClient + Send + Sync>,
    retry: RetryPolicy,
}

impl ContentScraper {
    pub fn new(client: Arc<dyn ForumClient + Send + Sync>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Collects up to `post_limit` hot posts of `community` with their
    /// flattened comments. Posts that keep failing with transient errors are
    /// left out; any other error aborts the scrape.
    pub async fn scrape(
        &self,
        community: &str,
        post_limit: usize,
        max_comments_per_post: Option<usize>,
    ) -> Result<Corpus, ForumError> {
        let submissions = self.client.hot_posts(community, post_limit).await?;

        let mut corpus = Vec::with_capacity(submissions.len().min(post_limit));
        for submission in submissions.iter().take(post_limit) {
            if let Some(forest) = self.comment_tree(submission).await? {
                corpus.push(build_post(submission, &forest, max_comments_per_post));
            }
        }

        tracing::info!(
            community,
            posts = corpus.len(),
            dropped = submissions.len().min(post_limit) - corpus.len(),
            "scraped community"
        );

        Ok(corpus)
    }

    async fn comment_tree(
        &self,
        submission: &Submission,
    ) -> Result<Option<CommentForest>, ForumError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.client.comment_tree(submission).await {
                Ok(forest) => return Ok(Some(forest)),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            let delay = self.retry.backoff.delay(attempt);
            tracing::warn!(
                post = %submission.id,
                attempt,
                max_attempts,
                cooldown_secs = delay.as_secs_f64(),
                error = %err,
                "forum api error while scraping post"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if attempt >= max_attempts {
                tracing::warn!(post = %submission.id, title = %submission.title, "dropping post");
                return Ok(None);
            }
        }
    }
}

fn build_post(
    submission: &Submission,
    forest: &CommentForest,
    max_comments_per_post: Option<usize>,
) -> Post {
    // any requested limit is replaced by the fixed cap
    let keep = match max_comments_per_post {
        Some(_) => COMMENT_CAP,
        None => usize::MAX,
    };

    Post {
        title: submission.title.clone(),
        url: submission.url.clone(),
        comments: forest
            .flatten()
            .into_iter()
            .take(keep)
            .map(|comment| comment.body.clone())
            .collect(),
    }
}

#[derive(Deserialize, JsonSchema)]
struct ScrapeArgs {
    /// limit the number of comments collected per post, null for no limit
    #[serde(default = "default_max_comments")]
    max_comments_per_post: Option<usize>,
}

fn default_max_comments() -> Option<usize> {
    DEFAULT_MAX_COMMENTS
}

/// Exposes the scraper for the configured community to an agent.
pub struct ScrapeForumTool {
    scraper: ContentScraper,
    community: String,
    post_limit: usize,
}

impl ScrapeForumTool {
    pub const NAME: &'static str = "scrape_forum";

    pub fn new(scraper: ContentScraper, community: &str, post_limit: usize) -> Box<Self> {
        Box::new(Self {
            scraper,
            community: community.to_string(),
            post_limit,
        })
    }
}

#[async_trait]
impl FunctionalTool for ScrapeForumTool {
    fn definition(&self) -> agent::Result<ToolDefinition> {
        ToolDefinition::new::<ScrapeArgs>(
            Self::NAME,
            &format!(
                "Scrape the hottest posts of the {} community together with their top comments. Returns a JSON list of posts with title, url and comments.",
                self.community
            ),
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> agent::Result<Message> {
        let args: ScrapeArgs = call.args()?;

        let corpus = self
            .scraper
            .scrape(&self.community, self.post_limit, args.max_comments_per_post)
            .await
            .map_err(|err| agent::Error::tool(Self::NAME, err))?;

        Ok(call.result(serde_json::to_string_pretty(&corpus)?))
    }
}
