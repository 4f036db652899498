/// Persona an agent adopts for every task it executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    /// Unique key used by tasks and coworkers to refer to the agent.
    pub name: String,
    /// Job title presented to the model. Several agents may share one.
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub allow_delegation: bool,
}

impl Role {
    pub fn new(name: &str, role: &str, goal: String, backstory: String) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            goal,
            backstory,
            allow_delegation: false,
        }
    }

    pub fn allow_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\n{}\n\nYour personal goal is: {}",
            self.role,
            self.backstory.trim(),
            self.goal
        )
    }

    pub(crate) fn is_named(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key.trim())
    }

    pub(crate) fn has_title(&self, key: &str) -> bool {
        self.role.eq_ignore_ascii_case(key.trim())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.role)
    }
}
