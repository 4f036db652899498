use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Tool {0} does not exist")]
    ToolDoesNotExist(String),

    #[error("Agent {0} does not exist")]
    AgentDoesNotExist(String),

    #[error("Task {0} does not exist")]
    TaskDoesNotExist(String),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Tool {name} failed: {source}")]
    ToolError {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Agent workflow error: {0}")]
    AgentWorkflowError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    pub fn tool<E>(name: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ToolError {
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}
