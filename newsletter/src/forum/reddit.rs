use crate::error::ForumError;
use crate::forum::{Comment, CommentForest, ForumClient, Submission};
use async_trait::async_trait;
use reqwest::{StatusCode, redirect};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_URL: &str = "https://oauth.reddit.com";

/// Largest page the listing endpoints return.
const MAX_PAGE_SIZE: usize = 100;

/// Refresh the token this long before reddit would expire it.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Application-only OAuth client for the reddit api.
pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    token_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, ForumError> {
        Self::with_base_urls(credentials, TOKEN_URL, API_URL)
    }

    /// Client talking to another token endpoint and api root.
    pub fn with_base_urls(
        credentials: RedditCredentials,
        token_url: &str,
        api_url: &str,
    ) -> Result<Self, ForumError> {
        // an unknown subreddit redirects to the search page
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            credentials,
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ForumError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() + TOKEN_MARGIN {
                return Ok(current.value.clone());
            }
        }

        tracing::debug!("requesting reddit access token");

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let response = check_status(response, "").await?;
        let granted: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;

        let value = granted.access_token.clone();
        *token = Some(AccessToken {
            value: granted.access_token,
            expires_at: expiry(Instant::now(), granted.expires_in),
        });

        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        community: &str,
    ) -> Result<T, ForumError> {
        let token = self.access_token().await?;

        tracing::debug!(path, "reddit api request");

        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let response = check_status(response, community).await?;
        decode(&response.bytes().await?)
    }
}

#[async_trait]
impl ForumClient for RedditClient {
    async fn hot_posts(
        &self,
        community: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, ForumError> {
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let mut query = vec![
                ("limit", (limit - posts.len()).min(MAX_PAGE_SIZE).to_string()),
                ("raw_json", "1".to_string()),
            ];
            if let Some(after) = &after {
                query.push(("after", after.clone()));
            }

            let listing: Listing = self
                .get_json(&format!("/r/{}/hot", community), &query, community)
                .await?;

            if listing.data.children.is_empty() {
                break;
            }

            posts.extend(parse_links(listing.data.children)?);

            match listing.data.after {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        // stickied posts can push a page past the requested size
        posts.truncate(limit);

        tracing::debug!(community, posts = posts.len(), "fetched hot posts");

        Ok(posts)
    }

    async fn comment_tree(&self, submission: &Submission) -> Result<CommentForest, ForumError> {
        let (_, comments): (Listing, Listing) = self
            .get_json(
                &format!("/comments/{}", submission.id),
                &[("raw_json", "1".to_string())],
                "",
            )
            .await?;

        Ok(CommentForest {
            comments: parse_comments(comments)?,
        })
    }
}

/// When a token granted for `expires_in` seconds at `now` runs out. A lifetime
/// too large to represent yields a token that is already expired.
fn expiry(now: Instant, expires_in: u64) -> Instant {
    now.checked_add(Duration::from_secs(expires_in))
        .unwrap_or(now)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct LinkData {
    id: String,
    title: String,
    url: String,
}

#[derive(Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    body: String,
    // either "" or a nested listing
    #[serde(default)]
    replies: serde_json::Value,
}

fn parse_links(children: Vec<Thing>) -> Result<Vec<Submission>, ForumError> {
    children
        .into_iter()
        .filter(|thing| thing.kind == "t3")
        .map(|thing| {
            let link: LinkData = serde_json::from_value(thing.data)?;
            Ok(Submission {
                id: link.id,
                title: link.title,
                url: link.url,
            })
        })
        .collect()
}

fn parse_comments(listing: Listing) -> Result<Vec<Comment>, ForumError> {
    let mut comments = Vec::new();

    for thing in listing.data.children {
        // "more" stubs would need another request per stub
        if thing.kind != "t1" {
            continue;
        }

        let data: CommentData = serde_json::from_value(thing.data)?;

        let replies = if data.replies.is_object() {
            parse_comments(serde_json::from_value(data.replies)?)?
        } else {
            Vec::new()
        };

        comments.push(Comment::new(&data.id, &data.body).with_replies(replies));
    }

    Ok(comments)
}

/// Decodes a success body, surfacing `{"json": {"errors": [...]}}` payloads
/// as api errors.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ForumError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;

    if let Some(errors) = value
        .pointer("/json/errors")
        .and_then(serde_json::Value::as_array)
    {
        if !errors.is_empty() {
            return Err(ForumError::Api(serde_json::to_string(errors)?));
        }
    }

    Ok(serde_json::from_value(value)?)
}

async fn check_status(
    response: reqwest::Response,
    community: &str,
) -> Result<reqwest::Response, ForumError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reset = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status, reset.as_deref(), body, community))
}

fn status_error(
    status: StatusCode,
    reset: Option<&str>,
    body: String,
    community: &str,
) -> ForumError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ForumError::RateLimited {
            reset: reset
                .and_then(|r| r.trim().parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        },
        StatusCode::UNAUTHORIZED => ForumError::Unauthorized,
        StatusCode::FORBIDDEN => ForumError::Forbidden(community.to_string()),
        StatusCode::NOT_FOUND => ForumError::CommunityNotFound(community.to_string()),
        s if s.is_redirection() => ForumError::CommunityNotFound(community.to_string()),
        s => ForumError::Status {
            status: s.as_u16(),
            body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Listing, RedditClient, RedditCredentials, decode, expiry, parse_comments, parse_links,
        status_error,
    };
    use crate::error::ForumError;
    use crate::forum::{CommentForest, ForumClient, Submission};
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use std::time::{Duration, Instant};
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOT: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_b",
            "children": [
                {"kind": "t3", "data": {"id": "a", "title": "New 7B model", "url": "https://example.com/a", "stickied": true}},
                {"kind": "t3", "data": {"id": "b", "title": "Quantization tricks", "url": "https://www.reddit.com/r/LocalLLaMA/comments/b/"}}
            ]
        }
    }"#;

    const COMMENTS: &str = r#"[
        {"kind": "Listing", "data": {"after": null, "children": [{"kind": "t3", "data": {"id": "a", "title": "New 7B model", "url": "https://example.com/a"}}]}},
        {"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t1", "data": {"id": "c1", "body": "first", "replies": {
                "kind": "Listing", "data": {"after": null, "children": [
                    {"kind": "t1", "data": {"id": "c1r", "body": "reply", "replies": ""}},
                    {"kind": "more", "data": {"count": 4, "children": ["x", "y"]}}
                ]}
            }}},
            {"kind": "t1", "data": {"id": "c2", "body": "second", "replies": ""}},
            {"kind": "more", "data": {"count": 120, "children": ["z"]}}
        ]}}
    ]"#;

    #[test]
    fn test_parse_hot_listing() -> Result<(), ForumError> {
        let listing: Listing = decode(HOT.as_bytes())?;
        assert_eq!(listing.data.after.as_deref(), Some("t3_b"));

        let posts = parse_links(listing.data.children)?;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "a");
        assert_eq!(posts[0].title, "New 7B model");
        assert_eq!(posts[1].url, "https://www.reddit.com/r/LocalLLaMA/comments/b/");

        Ok(())
    }

    #[test]
    fn test_parse_comment_tree_drops_more_stubs() -> Result<(), ForumError> {
        let (_, comments): (Listing, Listing) = decode(COMMENTS.as_bytes())?;
        let forest = CommentForest {
            comments: parse_comments(comments)?,
        };

        let bodies: Vec<&str> = forest.flatten().iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "reply"]);

        Ok(())
    }

    #[test]
    fn test_api_error_payload() {
        let err = decode::<serde_json::Value>(
            br#"{"json": {"errors": [["RATELIMIT", "you are doing that too much", "ratelimit"]]}}"#,
        )
        .unwrap_err();

        assert!(matches!(&err, ForumError::Api(msg) if msg.contains("RATELIMIT")));
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some("42.0"), String::new(), "rust"),
            ForumError::RateLimited { reset: Some(d) } if d == Duration::from_secs(42)
        ));
        assert!(matches!(
            status_error(StatusCode::FOUND, None, String::new(), "nope"),
            ForumError::CommunityNotFound(c) if c == "nope"
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, String::new(), "private"),
            ForumError::Forbidden(c) if c == "private"
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, String::new(), "rust"),
            ForumError::Unauthorized
        ));

        let err = status_error(
            StatusCode::BAD_GATEWAY,
            None,
            "upstream".to_string(),
            "rust",
        );
        assert!(matches!(&err, ForumError::Status { status: 502, body } if body == "upstream"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unusable_rate_limit_reset_is_ignored() {
        for reset in ["-1", "NaN", "inf", "-inf", "1e400", "soon"] {
            let err = status_error(StatusCode::TOO_MANY_REQUESTS, Some(reset), String::new(), "rust");
            assert!(matches!(err, ForumError::RateLimited { reset: None }), "{}", reset);
            assert!(err.is_transient());
        }
    }

    #[test]
    fn test_token_expiry() {
        let now = Instant::now();
        assert_eq!(expiry(now, 3600), now + Duration::from_secs(3600));
        // unrepresentable lifetimes count as already expired
        assert_eq!(expiry(now, u64::MAX), now);
    }

    fn listing(ids: &[&str], after: Option<&str>) -> Value {
        json!({
            "kind": "Listing",
            "data": {
                "after": after,
                "children": ids.iter().map(|id| json!({
                    "kind": "t3",
                    "data": {"id": id, "title": format!("post {}", id), "url": format!("https://example.com/{}", id)}
                })).collect::<Vec<_>>()
            }
        })
    }

    /// Client against `server`, whose token endpoint grants tokens living
    /// `expires_in` seconds and must be hit exactly `token_requests` times.
    async fn client(server: &MockServer, expires_in: u64, token_requests: u64) -> RedditClient {
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(header("user-agent", "newsletter-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "token_type": "bearer",
                "expires_in": expires_in,
                "scope": "*"
            })))
            .expect(token_requests)
            .mount(server)
            .await;

        RedditClient::with_base_urls(
            RedditCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                user_agent: "newsletter-test".to_string(),
            },
            &format!("{}/api/v1/access_token", server.uri()),
            &server.uri(),
        )
        .expect("http client")
    }

    #[tokio::test]
    async fn test_hot_posts_follows_cursor_and_truncates() -> Result<(), ForumError> {
        let server = MockServer::start().await;
        let reddit = client(&server, 3600, 1).await;

        // the stickied post fills part of the first page
        Mock::given(method("GET"))
            .and(path("/r/rust/hot"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("limit", "3"))
            .and(query_param_is_missing("after"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["sticky", "a"], Some("t3_a"))))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/rust/hot"))
            .and(query_param("limit", "1"))
            .and(query_param("after", "t3_a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["b", "c"], Some("t3_c"))))
            .expect(2)
            .mount(&server)
            .await;

        for _ in 0..2 {
            let posts = reddit.hot_posts("rust", 3).await?;
            let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(ids, vec!["sticky", "a", "b"]);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_hot_posts_stops_when_listing_ends() -> Result<(), ForumError> {
        let server = MockServer::start().await;
        let reddit = client(&server, 3600, 1).await;

        Mock::given(method("GET"))
            .and(path("/r/small/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["a", "b"], None)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/quiet/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], Some("t3_x"))))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(reddit.hot_posts("small", 10).await?.len(), 2);
        assert!(reddit.hot_posts("quiet", 10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_token_refreshed_before_expiry() -> Result<(), ForumError> {
        let server = MockServer::start().await;
        // inside the refresh margin, so every call needs a new token
        let reddit = client(&server, 30, 2).await;

        Mock::given(method("GET"))
            .and(path("/r/rust/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["a"], None)))
            .expect(2)
            .mount(&server)
            .await;

        reddit.hot_posts("rust", 1).await?;
        reddit.hot_posts("rust", 1).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_comment_tree_over_http() -> Result<(), ForumError> {
        let server = MockServer::start().await;
        let reddit = client(&server, 3600, 1).await;

        Mock::given(method("GET"))
            .and(path("/comments/a"))
            .and(query_param("raw_json", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(COMMENTS))
            .expect(1)
            .mount(&server)
            .await;

        let forest = reddit
            .comment_tree(&Submission {
                id: "a".to_string(),
                title: "New 7B model".to_string(),
                url: "https://example.com/a".to_string(),
            })
            .await?;

        let bodies: Vec<&str> = forest.flatten().iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "reply"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_error_responses() {
        let server = MockServer::start().await;
        let reddit = client(&server, 3600, 1).await;

        Mock::given(method("GET"))
            .and(path("/r/missing/hot"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/moved/hot"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "https://www.reddit.com/subreddits/search?q=moved"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/busy/hot"))
            .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "-1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/slow/hot"))
            .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "12"))
            .mount(&server)
            .await;

        assert!(matches!(
            reddit.hot_posts("missing", 7).await,
            Err(ForumError::CommunityNotFound(c)) if c == "missing"
        ));
        assert!(matches!(
            reddit.hot_posts("moved", 7).await,
            Err(ForumError::CommunityNotFound(c)) if c == "moved"
        ));

        let err = reddit.hot_posts("busy", 7).await.expect_err("rate limited");
        assert!(matches!(err, ForumError::RateLimited { reset: None }));
        assert!(err.is_transient());

        assert!(matches!(
            reddit.hot_posts("slow", 7).await,
            Err(ForumError::RateLimited { reset: Some(d) }) if d == Duration::from_secs(12)
        ));
    }
}
