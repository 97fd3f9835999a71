//! Agent identity: who is speaking and which tools it may use.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An immutable agent definition. Share it as `Arc<Agent>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    system_prompt: String,
    tools: Vec<String>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Permitted tool names, in declaration order without duplicates.
    pub fn tools(&self) -> &[String] {
        &self.tools
    }
}

/// Validating builder for [`Agent`].
#[derive(Debug, Default)]
pub struct AgentBuilder {
    name: String,
    system_prompt: String,
    tools: Vec<String>,
}

impl AgentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Agent> {
        if self.name.trim().is_empty() {
            return Err(Error::config("agent name cannot be empty"));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(Error::config("agent system prompt cannot be empty"));
        }

        let mut tools: Vec<String> = Vec::with_capacity(self.tools.len());
        for name in self.tools {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }

        Ok(Agent {
            name: self.name,
            system_prompt: self.system_prompt,
            tools,
        })
    }
}
