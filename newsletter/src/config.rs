use crate::error::ConfigError;
use crate::forum::RedditCredentials;
use crate::scraper::{Backoff, DEFAULT_POST_LIMIT, RetryPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// How the pause after a failed post fetch grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    /// Same pause after every failure
    Fixed,
    /// Pause doubles after every failure, up to the max cooldown
    Exponential,
}

/// Turn the hottest posts of a forum community into a sourced blog article.
#[derive(Parser, Debug)]
#[command(name = "newsletter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Community to scrape
    #[arg(long, env = "SUB_REDDIT", default_value = "default_subreddit")]
    pub community: String,

    /// Topic the article is about
    #[arg(long, env = "SUBJECT", default_value = "default_subject")]
    pub subject: String,

    /// Chat model used by every agent
    #[arg(long, env = "OPENAI_MODEL_NAME", default_value = "gpt-4o")]
    pub model: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub serper_api_key: String,

    #[arg(long, env = "REDDIT_CLIENT_ID", hide_env_values = true)]
    pub reddit_client_id: String,

    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub reddit_client_secret: String,

    #[arg(long, env = "REDDIT_USER_AGENT")]
    pub reddit_user_agent: String,

    /// Number of hot posts to scrape
    #[arg(long, default_value_t = DEFAULT_POST_LIMIT)]
    pub post_limit: usize,

    /// Attempts per post before it is dropped from the corpus
    #[arg(long, default_value_t = 1)]
    pub scrape_attempts: u32,

    /// Pause after a failed post fetch, in seconds
    #[arg(long, default_value_t = 60)]
    pub scrape_cooldown_secs: u64,

    #[arg(long, value_enum, default_value_t = BackoffKind::Fixed)]
    pub scrape_backoff: BackoffKind,

    /// Longest pause with exponential backoff, in seconds
    #[arg(long, default_value_t = 600)]
    pub scrape_max_cooldown_secs: u64,

    /// Steps an agent may take on one task before it must answer
    #[arg(long, default_value_t = agent::DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Append a markdown transcript of every agent conversation to this file
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}

/// Process configuration, resolved once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub community: String,
    pub subject: String,
    pub model: String,
    pub openai_api_key: String,
    pub serper_api_key: String,
    pub reddit: RedditCredentials,
    pub post_limit: usize,
    pub retry: RetryPolicy,
    pub max_iterations: usize,
    pub transcript: Option<PathBuf>,
}

impl Config {
    /// Reads `.env`, the environment and the command line. Exits the process
    /// with a usage error when a required value is missing.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "could not load .env file");
            }
        }

        Config::try_from(Cli::parse())
    }
}

fn required(name: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, ConfigError> {
        if cli.scrape_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "scrape_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }

        if cli.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                name: "max_iterations",
                reason: "agents need at least one step".to_string(),
            });
        }

        let community = required("SUB_REDDIT", cli.community)?;
        let community = community
            .strip_prefix("r/")
            .unwrap_or(&community)
            .to_string();

        let retry = match (cli.scrape_cooldown_secs, cli.scrape_backoff) {
            (0, _) => RetryPolicy::immediate(cli.scrape_attempts),
            (secs, BackoffKind::Fixed) => RetryPolicy {
                max_attempts: cli.scrape_attempts,
                backoff: Backoff::Fixed(Duration::from_secs(secs)),
            },
            (secs, BackoffKind::Exponential) => {
                if cli.scrape_max_cooldown_secs < secs {
                    return Err(ConfigError::Invalid {
                        name: "scrape_max_cooldown_secs",
                        reason: format!("must be at least the cooldown of {}s", secs),
                    });
                }
                RetryPolicy {
                    max_attempts: cli.scrape_attempts,
                    backoff: Backoff::Exponential {
                        base: Duration::from_secs(secs),
                        max: Duration::from_secs(cli.scrape_max_cooldown_secs),
                    },
                }
            }
        };

        Ok(Self {
            community,
            subject: required("SUBJECT", cli.subject)?,
            model: required("OPENAI_MODEL_NAME", cli.model)?,
            openai_api_key: required("OPENAI_API_KEY", cli.openai_api_key)?,
            serper_api_key: required("SERPER_API_KEY", cli.serper_api_key)?,
            reddit: RedditCredentials {
                client_id: required("REDDIT_CLIENT_ID", cli.reddit_client_id)?,
                client_secret: required("REDDIT_CLIENT_SECRET", cli.reddit_client_secret)?,
                user_agent: required("REDDIT_USER_AGENT", cli.reddit_user_agent)?,
            },
            post_limit: cli.post_limit,
            retry,
            max_iterations: cli.max_iterations,
            transcript: cli.transcript,
        })
    }
}
