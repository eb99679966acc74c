use std::sync::Arc;

use anyhow::Result;

use crate::{conversation_model::ConversationModel, model_config::ModelConfig};

/// A fixed system instruction plus sampling temperature for one side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub agent_name: &'static str,
    pub system: &'static str,
    pub temperature: f64,
}

impl Persona {
    pub fn document_assistant() -> Self {
        Self {
            agent_name: "compose_agent",
            system: "You are a Legal Document Assistant specialized in real estate law. You help draft professional legal responses and documents. Focus on document review, contract analysis, and formal legal correspondence. Always include specific next steps and required documentation.",
            temperature: 0.3,
        }
    }

    pub fn legal_advisor() -> Self {
        Self {
            agent_name: "research_agent",
            system: "You are a Real Estate Legal Advisor with expertise in property transactions and client relations. You conduct research and provide practical legal advice. Focus on building client relationships, clear communication, and actionable guidance for real estate matters.",
            temperature: 0.7,
        }
    }
}

pub struct Agent {
    model: Arc<dyn ConversationModel>,
    persona: Persona,
}

impl Agent {
    pub fn new(model: Arc<dyn ConversationModel>, persona: Persona) -> Self {
        Self { model, persona }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn provider_name(&self) -> &'static str {
        self.model.provider_name()
    }

    /// The persona overrides whatever system prompt and temperature the base config carries.
    pub fn config_for(&self, base: &ModelConfig) -> ModelConfig {
        base.clone()
            .with_system(self.persona.system)
            .with_temperature(self.persona.temperature)
    }

    pub async fn respond(&self, input: &str, base: &ModelConfig) -> Result<String> {
        let config = self.config_for(base);
        self.model.generate(input, &config).await
    }
}
