use crate::config::Config;
use agent::callbacks::MessageLogger;
use agent::llm::LLM;
use agent::tools::Tool;
use agent::{Agent, AgentBuilder, Crew, Result, Role, Task, TaskContext, TaskOutput};
use std::fs::OpenOptions;
use std::sync::Arc;

pub const EXPLORER: &str = "explorer";
pub const WRITER: &str = "writer";
pub const SOURCERER: &str = "sourcerer";
pub const CRITIC: &str = "critic";

pub const REPORT: &str = "report";
pub const BLOG: &str = "blog";
pub const SOURCING: &str = "sourcing";
pub const CRITIQUE: &str = "critique";

const EXPLORER_BACKSTORY: &str = include_str!("prompts/explorer.md");
const WRITER_BACKSTORY: &str = include_str!("prompts/writer.md");
const SOURCERER_BACKSTORY: &str = include_str!("prompts/sourcerer.md");
const CRITIC_BACKSTORY: &str = include_str!("prompts/critic.md");

const REPORT_TASK: &str = include_str!("prompts/report.md");
const BLOG_TASK: &str = include_str!("prompts/blog.md");
const SOURCING_TASK: &str = include_str!("prompts/sourcing.md");
const CRITIQUE_TASK: &str = include_str!("prompts/critique.md");

fn render(template: &str, config: &Config) -> String {
    template
        .replace("{subject}", &config.subject)
        .replace("{community}", &config.community)
}

/// Explorer, writer, sourcerer and critic, in that order.
pub fn roles(config: &Config) -> [Role; 4] {
    [
        Role::new(
            EXPLORER,
            "Senior Researcher",
            format!(
                "Find and explore the most exciting projects and companies on the {} community",
                config.community
            ),
            render(EXPLORER_BACKSTORY, config),
        ),
        Role::new(
            WRITER,
            "Senior Technical Writer",
            format!(
                "Write an engaging and interesting blog post about the latest {} projects using simple, layman vocabulary",
                config.subject
            ),
            render(WRITER_BACKSTORY, config),
        )
        .allow_delegation(true),
        Role::new(
            SOURCERER,
            "Senior Researcher",
            "Find and explore the most relevant link sources for any tools, products or projects as requested".to_string(),
            render(SOURCERER_BACKSTORY, config),
        ),
        Role::new(
            CRITIC,
            "Expert Writing Critic",
            "Provide feedback on blog post drafts and make sure that the tone and writing style is compelling, simple and concise".to_string(),
            render(CRITIC_BACKSTORY, config),
        )
        .allow_delegation(true),
    ]
}

pub fn tasks(config: &Config) -> Vec<Task> {
    vec![
        Task::new(REPORT, &render(REPORT_TASK, config), EXPLORER).expected_output(
            "A bullet point report of 5-10 projects or tools, each described in exactly three sentences.",
        ),
        Task::new(BLOG, &render(BLOG_TASK, config), WRITER)
            .expected_output("A markdown blog article with a headline, an introduction, at least 10 paragraphs in titled sections and a conclusion.")
            .context(TaskContext::Previous),
        Task::new(SOURCING, &render(SOURCING_TASK, config), SOURCERER)
            .expected_output("The complete article with a searched source link attached to every section title.")
            .context(TaskContext::Previous),
        Task::new(CRITIQUE, &render(CRITIQUE_TASK, config), CRITIC)
            .expected_output("The complete final article in the required markdown format.")
            .context(TaskContext::Previous),
    ]
}

/// Tools bound to the roles that use them.
pub struct Toolset {
    pub scrape: Box<dyn Tool + Send>,
    pub search: Box<dyn Tool + Send>,
    pub human: Box<dyn Tool + Send>,
}

/// Bullet point report on the scraped corpus.
pub struct Report(TaskOutput);

/// Article written from the report, without sources.
pub struct BlogDraft(TaskOutput);

/// Draft with a source link on every section title.
pub struct SourcedDraft(TaskOutput);

/// Reviewed, final article.
pub struct Article(TaskOutput);

impl Report {
    pub fn text(&self) -> &str {
        &self.0.raw
    }
}

impl BlogDraft {
    pub fn text(&self) -> &str {
        &self.0.raw
    }
}

impl SourcedDraft {
    pub fn text(&self) -> &str {
        &self.0.raw
    }
}

impl Article {
    pub fn text(&self) -> &str {
        &self.0.raw
    }
}

impl std::fmt::Display for Article {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// The report -> blog -> sourcing -> critique chain. Each stage consumes the
/// previous stage's output.
pub struct Newsletter {
    crew: Crew,
}

impl Newsletter {
    pub fn new(config: &Config, llm: Arc<dyn LLM + Send + Sync>, tools: Toolset) -> Result<Self> {
        let build = |role: Role, tools: Vec<Box<dyn Tool + Send>>| -> Result<Agent> {
            let mut builder = AgentBuilder::new()
                .llm(llm.clone())
                .tools(tools)
                .max_iterations(config.max_iterations);

            if let Some(path) = &config.transcript {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                builder = builder.callback(MessageLogger::new(&role.name, file)?);
            }

            builder.role(role).build()
        };

        let [explorer, writer, sourcerer, critic] = roles(config);

        let crew = Crew::new(
            vec![
                build(explorer, vec![tools.scrape])?,
                build(writer, vec![])?,
                build(sourcerer, vec![tools.search, tools.human])?,
                build(critic, vec![])?,
            ],
            tasks(config),
        )?;

        Ok(Self { crew })
    }

    pub async fn report(&mut self) -> Result<Report> {
        Ok(Report(self.crew.execute_task(REPORT, None).await?))
    }

    pub async fn draft(&mut self, report: &Report) -> Result<BlogDraft> {
        Ok(BlogDraft(
            self.crew.execute_task(BLOG, Some(&report.0)).await?,
        ))
    }

    pub async fn source(&mut self, draft: &BlogDraft) -> Result<SourcedDraft> {
        Ok(SourcedDraft(
            self.crew.execute_task(SOURCING, Some(&draft.0)).await?,
        ))
    }

    pub async fn critique(&mut self, draft: &SourcedDraft) -> Result<Article> {
        Ok(Article(
            self.crew.execute_task(CRITIQUE, Some(&draft.0)).await?,
        ))
    }

    pub async fn run(mut self) -> Result<Article> {
        let report = self.report().await?;
        tracing::debug!(chars = report.text().len(), "report ready");

        let draft = self.draft(&report).await?;
        tracing::debug!(chars = draft.text().len(), "draft ready");

        let sourced = self.source(&draft).await?;
        tracing::debug!(chars = sourced.text().len(), "sources attached");

        self.critique(&sourced).await
    }
}
