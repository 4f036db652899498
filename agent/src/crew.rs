use crate::agent::Agent;
use crate::tools::{AskQuestion, Coworker, DelegateWork};
use crate::{Error, Result};

/// Whether a task receives the output of the task executed before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskContext {
    None,
    Previous,
}

#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: Option<String>,
    /// Role name of the agent that executes the task.
    pub agent: String,
    pub context: TaskContext,
}

impl Task {
    pub fn new(name: &str, description: &str, agent: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            expected_output: None,
            agent: agent.to_string(),
            context: TaskContext::None,
        }
    }

    pub fn expected_output(mut self, expected_output: &str) -> Self {
        self.expected_output = Some(expected_output.to_string());
        self
    }

    pub fn context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn prompt(&self, context: Option<&str>) -> String {
        let mut prompt = self.description.trim().to_string();

        if let Some(expected) = &self.expected_output {
            prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
            prompt.push_str(expected.trim());
            prompt.push_str(
                "\nYou MUST return the actual complete content as the final answer, not a summary.",
            );
        }

        if let Some(context) = context {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            prompt.push_str(context);
        }

        prompt
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
}

/// A fixed set of agents executing an ordered list of tasks one at a time.
pub struct Crew {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    statuses: Vec<TaskStatus>,
}

impl Crew {
    /// Validates the task bindings and hands every agent that may delegate a
    /// roster of the other agents.
    pub fn new(mut agents: Vec<Agent>, tasks: Vec<Task>) -> Result<Self> {
        for (i, task) in tasks.iter().enumerate() {
            if !agents.iter().any(|a| a.role().name == task.agent) {
                return Err(Error::AgentDoesNotExist(task.agent.clone()));
            }
            if tasks[..i].iter().any(|t| t.name == task.name) {
                return Err(Error::AgentWorkflowError(format!(
                    "duplicate task name {}",
                    task.name
                )));
            }
        }

        let roster: Vec<Coworker> = agents
            .iter()
            .map(|a| Coworker {
                role: a.role().clone(),
                llm: a.llm(),
            })
            .collect();

        for agent in agents.iter_mut() {
            if !agent.role().allow_delegation {
                continue;
            }
            let coworkers: Vec<Coworker> = roster
                .iter()
                .filter(|c| c.role.name != agent.role().name)
                .cloned()
                .collect();
            if coworkers.is_empty() {
                continue;
            }
            agent.register_tool(DelegateWork::new(coworkers.clone()))?;
            agent.register_tool(AskQuestion::new(coworkers))?;
        }

        let statuses = vec![TaskStatus::Pending; tasks.len()];

        Ok(Self {
            agents,
            tasks,
            statuses,
        })
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.role().name == name)
    }

    pub fn status(&self, task: &str) -> Option<TaskStatus> {
        self.tasks
            .iter()
            .position(|t| t.name == task)
            .map(|i| self.statuses[i])
    }

    /// Executes a single task. Every task declared before it must already be
    /// completed.
    pub async fn execute_task(
        &mut self,
        name: &str,
        context: Option<&TaskOutput>,
    ) -> Result<TaskOutput> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.name == name)
            .ok_or(Error::TaskDoesNotExist(name.to_string()))?;

        if let Some(blocking) = self.tasks[..index]
            .iter()
            .zip(&self.statuses)
            .find(|(_, status)| **status != TaskStatus::Completed)
        {
            return Err(Error::AgentWorkflowError(format!(
                "task {} cannot start before task {} completes",
                name, blocking.0.name
            )));
        }

        if self.statuses[index] != TaskStatus::Pending {
            return Err(Error::AgentWorkflowError(format!(
                "task {} is {:?}, expected Pending",
                name, self.statuses[index]
            )));
        }

        let task = &self.tasks[index];
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.role().name == task.agent)
            .ok_or(Error::AgentDoesNotExist(task.agent.clone()))?;

        let context = match task.context {
            TaskContext::Previous => context.map(|c| c.raw.as_str()),
            TaskContext::None => None,
        };

        self.statuses[index] = TaskStatus::Running;
        tracing::info!(task = %task.name, agent = %task.agent, "task started");

        match agent.execute_task(task, context).await {
            Ok(raw) => {
                self.statuses[index] = TaskStatus::Completed;
                tracing::info!(task = %task.name, agent = %task.agent, chars = raw.len(), "task completed");
                Ok(TaskOutput {
                    task: task.name.clone(),
                    agent: task.agent.clone(),
                    raw,
                })
            }
            Err(err) => {
                self.statuses[index] = TaskStatus::Failed;
                tracing::error!(task = %task.name, agent = %task.agent, error = %err, "task failed");
                Err(err)
            }
        }
    }

    /// Runs every task in order, feeding each output forward, and returns
    /// the output of the last task.
    pub async fn kickoff(&mut self) -> Result<TaskOutput> {
        let names: Vec<String> = self.tasks.iter().map(|t| t.name.clone()).collect();

        let mut previous: Option<TaskOutput> = None;
        for name in names {
            previous = Some(self.execute_task(&name, previous.as_ref()).await?);
        }

        previous.ok_or(Error::AgentWorkflowError("crew has no tasks".to_string()))
    }
}
