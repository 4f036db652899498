mod config;
mod error;
mod forum;
mod human;
mod pipeline;
mod scraper;
mod search;

use config::Config;
use forum::RedditClient;
use human::HumanInput;
use pipeline::{Newsletter, Toolset};
use scraper::{ContentScraper, ScrapeForumTool};
use search::{SearchInternet, SerperSearch};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;

    tracing::info!(
        community = %config.community,
        subject = %config.subject,
        model = %config.model,
        "starting newsletter"
    );

    let llm = agent::llm::OpenAI::new(config.model.clone(), &config.openai_api_key);

    let reddit = Arc::new(RedditClient::new(config.reddit.clone())?);
    let scraper = ContentScraper::new(reddit, config.retry);

    let tools = Toolset {
        scrape: ScrapeForumTool::new(scraper, &config.community, config.post_limit),
        search: SearchInternet::new(SerperSearch::new(&config.serper_api_key)?),
        human: HumanInput::stdio(),
    };

    let article = Newsletter::new(&config, llm, tools)?.run().await?;

    println!("######################");
    println!("{}", article);

    Ok(())
}
