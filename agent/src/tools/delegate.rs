use crate::Result;
use crate::llm::{CompletionRequest, LLM, Message};
use crate::role::Role;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// Another crew member that can be handed work.
#[derive(Clone)]
pub struct Coworker {
    pub role: Role,
    pub llm: Arc<dyn LLM + Send + Sync>,
}

impl Coworker {
    async fn answer(&self, request: String) -> Result<String> {
        let messages = [
            Message::System(self.role.system_prompt()),
            Message::User(request),
        ];

        let response = self
            .llm
            .completion(CompletionRequest {
                messages: &messages,
                tools: &[],
            })
            .await?;

        Ok(response.content)
    }
}

/// Looks a coworker up by name, or by job title when only one coworker holds
/// it. The error is the text handed back to the model.
fn find<'a>(coworkers: &'a [Coworker], key: &str) -> std::result::Result<&'a Coworker, String> {
    if let Some(coworker) = coworkers.iter().find(|c| c.role.is_named(key)) {
        return Ok(coworker);
    }

    let titled: Vec<&Coworker> = coworkers.iter().filter(|c| c.role.has_title(key)).collect();
    match titled.as_slice() {
        [coworker] => Ok(*coworker),
        [] => Err(format!(
            "Error: there is no coworker named {}. Available coworkers: {}",
            key,
            roster(coworkers)
        )),
        several => Err(format!(
            "Error: several coworkers are {}, name one of them: {}",
            key,
            several
                .iter()
                .map(|c| c.role.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

fn roster(coworkers: &[Coworker]) -> String {
    coworkers
        .iter()
        .map(|c| c.role.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Deserialize, JsonSchema)]
struct DelegateArgs {
    /// name of the coworker to hand the task to
    coworker: String,
    /// the task to delegate, described in full
    task: String,
    /// everything the coworker needs to know to do the task
    #[serde(default)]
    context: String,
}

pub struct DelegateWork {
    coworkers: Vec<Coworker>,
}

impl DelegateWork {
    pub fn new(coworkers: Vec<Coworker>) -> Box<Self> {
        Box::new(Self { coworkers })
    }
}

#[async_trait]
impl FunctionalTool for DelegateWork {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<DelegateArgs>(
            "delegate_work_to_coworker",
            &format!(
                "Delegate a specific task to one of the following coworkers: {}. The coworker knows nothing about your task, so share all the context you have.",
                roster(&self.coworkers)
            ),
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: DelegateArgs = call.args()?;

        let coworker = match find(&self.coworkers, &args.coworker) {
            Ok(coworker) => coworker,
            Err(reason) => return Ok(call.result(reason)),
        };

        tracing::info!(coworker = %coworker.role, "delegating work");

        let answer = coworker
            .answer(format!(
                "{}\n\nThis is the context you're working with:\n{}",
                args.task, args.context
            ))
            .await?;

        Ok(call.result(answer))
    }
}

#[derive(Deserialize, JsonSchema)]
struct QuestionArgs {
    /// name of the coworker to ask
    coworker: String,
    /// the question to ask
    question: String,
    /// everything the coworker needs to know to answer
    #[serde(default)]
    context: String,
}

pub struct AskQuestion {
    coworkers: Vec<Coworker>,
}

impl AskQuestion {
    pub fn new(coworkers: Vec<Coworker>) -> Box<Self> {
        Box::new(Self { coworkers })
    }
}

#[async_trait]
impl FunctionalTool for AskQuestion {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<QuestionArgs>(
            "ask_question_to_coworker",
            &format!(
                "Ask a specific question to one of the following coworkers: {}. The coworker knows nothing about your task, so share all the context you have.",
                roster(&self.coworkers)
            ),
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: QuestionArgs = call.args()?;

        let coworker = match find(&self.coworkers, &args.coworker) {
            Ok(coworker) => coworker,
            Err(reason) => return Ok(call.result(reason)),
        };

        tracing::info!(coworker = %coworker.role, "asking coworker");

        let answer = coworker
            .answer(format!(
                "{}\n\nThis is the context you're working with:\n{}",
                args.question, args.context
            ))
            .await?;

        Ok(call.result(answer))
    }
}
