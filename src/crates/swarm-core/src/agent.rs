//! Agent identity and persona types
//!
//! An [`AgentDescriptor`] names one agent: who it is, which model and
//! provider serve it, and the system prompt it runs with. Descriptors
//! are attached to graph nodes and are immutable for the duration of a
//! run. A [`PersonaConfig`] can be layered on top at context-assembly
//! time, either as a verbatim prompt or as structured fields rendered
//! into a canonical block.
//!
//! # Examples
//!
//! ```rust
//! use swarm_core::agent::AgentDescriptor;
//!
//! let agent = AgentDescriptor::new("reviewer-1", "Reviewer", "reviewer", "Review code critically.")
//!     .with_model("claude-3-5-sonnet-20241022")
//!     .with_temperature(0.2);
//!
//! assert_eq!(agent.id, "reviewer-1");
//! assert_eq!(agent.model.as_deref(), Some("claude-3-5-sonnet-20241022"));
//! ```

use serde::{Deserialize, Serialize};

/// Identity of an agent bound to a graph node
///
/// Serializes in the camelCase wire shape coordinators emit; only `id`
/// is required on deserialization so dynamically emitted agents can be
/// sparse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    /// Stable identifier, unique within a run
    pub id: String,

    /// Display name used in events
    #[serde(default)]
    pub name: String,

    /// Role tag (e.g. "researcher", "reviewer"); also the persona lookup key
    #[serde(default)]
    pub role: String,

    /// Base system prompt for this agent
    #[serde(default)]
    pub system_prompt: String,

    /// Model override; falls back to the engine default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Output token cap override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Names an entry in the provider registry; falls back to the
    /// default provider when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Persona attached at assembly time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaConfig>,
}

impl AgentDescriptor {
    /// Create a descriptor with the required identity fields
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            provider_id: None,
            persona: None,
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Route this agent through a named provider
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Attach a persona
    pub fn with_persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = Some(persona);
        self
    }
}

/// Persona configuration injected at the highest context priority
///
/// A persona either carries a `full_prompt` used verbatim, or a set of
/// structured fields rendered into a canonical block. When both are
/// present the full prompt wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    /// Verbatim persona prompt; takes precedence over structured fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_prompt: Option<String>,

    /// Persona display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Persona role description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Personality traits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<String>,

    /// Hard constraints on behavior
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,

    /// Preferred communication style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,

    /// Areas of expertise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expertise: Vec<String>,
}

impl PersonaConfig {
    /// Create a persona from a verbatim prompt
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            full_prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    /// Render the persona into the block injected into context
    ///
    /// Returns the full prompt verbatim when present; otherwise the
    /// structured fields as labeled lines, skipping empty ones.
    pub fn render(&self) -> String {
        if let Some(prompt) = &self.full_prompt {
            return prompt.clone();
        }

        let mut lines = Vec::new();
        if let Some(name) = &self.name {
            lines.push(format!("Name: {}", name));
        }
        if let Some(role) = &self.role {
            lines.push(format!("Role: {}", role));
        }
        if !self.traits.is_empty() {
            lines.push(format!("Traits: {}", self.traits.join(", ")));
        }
        if !self.constraints.is_empty() {
            lines.push(format!("Constraints: {}", self.constraints.join("; ")));
        }
        if let Some(style) = &self.communication_style {
            lines.push(format!("Communication style: {}", style));
        }
        if !self.expertise.is_empty() {
            lines.push(format!("Expertise: {}", self.expertise.join(", ")));
        }
        lines.join("\n")
    }
}
