use crate::callbacks;
use crate::crew::Task;
use crate::llm;
use crate::role::Role;
use crate::tools;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

/// Stops once the model answers without requesting any tool.
pub struct FinalAnswer;

impl StopCondition for FinalAnswer {
    fn done(&self, history: &[llm::Message]) -> bool {
        history
            .last()
            .and_then(llm::Message::final_answer)
            .is_some()
    }
}

pub const DEFAULT_MAX_ITERATIONS: usize = 15;

const FORCE_FINAL_ANSWER: &str = "You have run out of steps. Stop using tools and give your absolute best final answer now, using only the information you already have.";

type Tool = Box<dyn tools::Tool + Send>;
type Callback = Box<dyn callbacks::Callback + Send>;

pub struct Agent {
    role: Role,
    llm: Arc<dyn llm::LLM + Send + Sync>,
    tools: HashMap<String, Tool>,
    callbacks: Vec<Callback>,
    tool_defs: Vec<tools::ToolDefinition>,
    stop_condition: Box<dyn StopCondition + Send>,
    max_iterations: usize,
}

impl Agent {
    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn llm(&self) -> Arc<dyn llm::LLM + Send + Sync> {
        self.llm.clone()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_defs.iter().map(|def| def.name.as_str()).collect()
    }

    pub(crate) fn register_tool(&mut self, tool: Tool) -> Result<()> {
        let def = tool.definition()?;
        self.tools.insert(def.name.clone(), tool);
        self.tool_defs.push(def);
        Ok(())
    }

    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        mut messages: Vec<llm::Message>,
    ) -> Result<Vec<llm::Message>> {
        let Some(tool) = self.tools.get_mut(&tool_call.name) else {
            tracing::warn!(agent = %self.role.name, tool = %tool_call.name, "model called an unknown tool");
            messages.push(tool_call.result(format!(
                "Error: {}. Available tools: {}",
                Error::ToolDoesNotExist(tool_call.name.clone()),
                self.tool_defs
                    .iter()
                    .map(|def| def.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
            return Ok(messages);
        };

        tracing::debug!(agent = %self.role.name, tool = %tool_call.name, args = %tool_call.args, "invoking tool");

        tool.invoke(tool_call, messages).await
    }

    async fn force_final_answer(
        &mut self,
        mut messages: Vec<llm::Message>,
    ) -> Result<Vec<llm::Message>> {
        tracing::warn!(
            agent = %self.role.name,
            max_iterations = self.max_iterations,
            "iteration budget exhausted, forcing a final answer"
        );

        messages.push(llm::Message::User(FORCE_FINAL_ANSWER.to_string()));

        let next = self
            .llm
            .completion(llm::CompletionRequest {
                messages: &messages,
                tools: &[],
            })
            .await?;

        messages.push(llm::Message::Assistant(next.content, vec![]));

        for callback in &mut self.callbacks {
            messages = callback.call(messages).await?;
        }

        Ok(messages)
    }

    pub async fn run(&mut self, mut messages: Vec<llm::Message>) -> Result<Vec<llm::Message>> {
        let mut iteration = 0;

        while !self.stop_condition.done(&messages) {
            if iteration == self.max_iterations {
                return self.force_final_answer(messages).await;
            }
            iteration += 1;

            tracing::debug!(agent = %self.role.name, iteration, "agent step");

            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    tools: &self.tool_defs,
                })
                .await?;

            messages.push(llm::Message::Assistant(
                next.content,
                next.tool_calls.clone(),
            ));

            for tool_call in &next.tool_calls {
                messages = self.execute_tool_call(tool_call, messages).await?;
            }

            for callback in &mut self.callbacks {
                messages = callback.call(messages).await?;
            }
        }

        Ok(messages)
    }

    /// Runs `task` in this agent's persona and returns the final answer.
    pub async fn execute_task(&mut self, task: &Task, context: Option<&str>) -> Result<String> {
        let messages = vec![
            llm::Message::System(self.role.system_prompt()),
            llm::Message::User(task.prompt(context)),
        ];

        let history = self.run(messages).await?;

        history
            .iter()
            .rev()
            .find_map(llm::Message::final_answer)
            .map(str::to_string)
            .ok_or(Error::LLMResponseError(format!(
                "agent {} finished task {} without a final answer",
                self.role.name, task.name
            )))
    }
}

pub struct AgentBuilder {
    role: Option<Role>,
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    tools: Vec<Tool>,
    callbacks: Vec<Callback>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_iterations: usize,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            role: None,
            llm: None,
            tools: Vec::new(),
            callbacks: Vec::new(),
            stop_condition: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut agent = Agent {
            role: self
                .role
                .ok_or(Error::MissingArg("role is required for agent".to_string()))?,
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            tools: HashMap::new(),
            tool_defs: Vec::new(),
            callbacks: self.callbacks,
            stop_condition: self.stop_condition.unwrap_or(Box::new(FinalAnswer)),
            max_iterations: self.max_iterations,
        };

        for tool in self.tools {
            agent.register_tool(tool)?;
        }

        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use crate::crew::Task;
    use crate::llm::{CompletionRequest, CompletionResponse, LLM, Message};
    use crate::role::Role;
    use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
    use crate::{AgentBuilder, Result, StopCondition};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MockLLM;

    #[async_trait]
    impl LLM for MockLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            match request.messages.last() {
                Some(Message::User(_)) => Ok(CompletionResponse {
                    content: "tool call".to_string(),
                    tool_calls: vec![ToolCall {
                        id: "call1".to_string(),
                        name: "double".to_string(),
                        args: "{\"arg\":123}".to_string(),
                    }],
                }),
                Some(Message::Tool { .. }) => Ok(CompletionResponse {
                    content: "tool call recieved".to_string(),
                    tool_calls: vec![],
                }),
                Some(Message::Assistant(_, _)) => Ok(CompletionResponse {
                    content: "completed".to_string(),
                    tool_calls: vec![],
                }),
                _ => panic!("unexpected message sequence"),
            }
        }
    }

    /// Keeps calling a tool that does not exist until told to stop.
    struct StubbornLLM;

    #[async_trait]
    impl LLM for StubbornLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            if request.tools.is_empty() {
                return Ok(CompletionResponse {
                    content: "forced answer".to_string(),
                    tool_calls: vec![],
                });
            }
            Ok(CompletionResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: format!("call{}", request.messages.len()),
                    name: "missing".to_string(),
                    args: "{}".to_string(),
                }],
            })
        }
    }

    struct DoubleTool;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct DoubleArgs {
        arg: i32,
    }

    #[async_trait]
    impl FunctionalTool for DoubleTool {
        fn definition(&self) -> Result<ToolDefinition> {
            ToolDefinition::new::<DoubleArgs>("double", "double")
        }

        async fn invoke_fn(&mut self, tool_call: &ToolCall) -> Result<Message> {
            let args: DoubleArgs = tool_call.args()?;
            Ok(Message::Tool {
                id: tool_call.id.clone(),
                name: "double".to_string(),
                result: format!("2 * {} = {}", args.arg, 2 * args.arg),
            })
        }
    }

    struct SimpleStop;

    impl StopCondition for SimpleStop {
        fn done(&self, history: &[Message]) -> bool {
            if let Some(Message::Assistant(content, _)) = history.last() {
                content == "completed"
            } else {
                false
            }
        }
    }

    fn role() -> Role {
        Role::new(
            "tester",
            "Tester",
            "test things".to_string(),
            "You test.".to_string(),
        )
    }

    #[tokio::test]
    async fn test_agent() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .role(role())
            .llm(Arc::new(MockLLM))
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(SimpleStop))
            .build()?;

        let history = agent
            .run(vec![Message::User("do stuff".to_string())])
            .await?;

        assert_eq!(history.len(), 5);

        assert!(matches!(&history[0], Message::User (content) if content == "do stuff"));
        assert!(matches!(&history[1], Message::Assistant (_, tool_calls) if tool_calls.len() == 1));
        assert!(matches!(&history[2], Message::Tool {  result,.. } if result == "2 * 123 = 246"));
        assert!(
            matches!(&history[3], Message::Assistant (content, _) if content== "tool call recieved")
        );
        assert!(matches!(&history[4], Message::Assistant (content, _) if content== "completed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_execute_task_stops_at_final_answer() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .role(role())
            .llm(Arc::new(MockLLM))
            .tool(Box::new(DoubleTool))
            .build()?;

        let task = Task::new("double", "double 123", "tester");
        let answer = agent.execute_task(&task, None).await?;

        assert_eq!(answer, "tool call recieved");

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_and_iteration_budget() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .role(role())
            .llm(Arc::new(StubbornLLM))
            .tool(Box::new(DoubleTool))
            .max_iterations(2)
            .build()?;

        let history = agent
            .run(vec![Message::User("do stuff".to_string())])
            .await?;

        // user, 2 x (assistant + tool error), forced prompt, forced answer
        assert_eq!(history.len(), 7);
        assert!(matches!(&history[2], Message::Tool { result, .. }
            if result == "Error: Tool missing does not exist. Available tools: double"));
        assert!(matches!(&history[6], Message::Assistant(content, calls)
            if content == "forced answer" && calls.is_empty()));

        Ok(())
    }

    #[test]
    fn test_build_requires_role_and_llm() {
        assert!(AgentBuilder::new().llm(Arc::new(MockLLM)).build().is_err());
        assert!(AgentBuilder::new().role(role()).build().is_err());
    }
}
