mod agent;
pub mod callbacks;
mod crew;
mod error;
pub mod llm;
mod role;
pub mod tools;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use agent::{Agent, AgentBuilder, DEFAULT_MAX_ITERATIONS, FinalAnswer, StopCondition};
pub use crew::{Crew, Task, TaskContext, TaskOutput, TaskStatus};
pub use role::Role;
