use std::collections::HashMap;

/// How a translated command's standard streams should be wired up once an
/// external collaborator actually spawns it (spec §1 Non-goals: this crate
/// never spawns anything itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdio {
    Inherit,
    Null,
}

/// One subprocess invocation the acloud translator wants run, expressed as
/// data rather than executed directly (spec §4.E, §1).
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdio: Stdio,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            stdio: Stdio::Inherit,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_stdio(mut self, stdio: Stdio) -> Self {
        self.stdio = stdio;
        self
    }
}
