pub mod templates;

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    agent::{Agent, Persona},
    conversation_model::ConversationModel,
    error::GenerationError,
    evaluation::ResponseSource,
    legacy_backend::LegacyBackend,
    model_config::ModelConfig,
};

use templates::{DOCUMENT_REQUEST, NEXT_STEPS, extract_recipient_name};

const SIMULATED_SUFFIX: &str = "_simulated";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model_config: ModelConfig,
    pub primary_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_config: ModelConfig::default(),
            primary_timeout: Duration::from_secs(30),
        }
    }
}

impl GeneratorConfig {
    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.primary_timeout.is_zero() {
            return Err("Primary timeout must be greater than 0".to_string());
        }
        self.model_config.validate()
    }
}

/// Correlation ids carried into logs and the legacy probe; they never change
/// what text gets generated.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResponses {
    pub response_a: String,
    pub response_b: String,
    pub agent_a: String,
    pub agent_b: String,
    pub source: ResponseSource,
    pub model: Option<String>,
    pub backend_response_id: Option<String>,
}

impl ComparisonResponses {
    pub fn is_simulated(&self) -> bool {
        self.source == ResponseSource::Simulated
    }
}

pub struct ResponseGenerator {
    agents: Option<(Agent, Agent)>,
    legacy: Option<Arc<dyn LegacyBackend>>,
    config: GeneratorConfig,
}

impl ResponseGenerator {
    /// Without a model every comparison is simulated.
    pub fn new(model: Option<Arc<dyn ConversationModel>>, config: GeneratorConfig) -> Self {
        let agents = model.map(|model| {
            (
                Agent::new(Arc::clone(&model), Persona::document_assistant()),
                Agent::new(model, Persona::legal_advisor()),
            )
        });

        Self {
            agents,
            legacy: None,
            config,
        }
    }

    pub fn with_legacy_backend(mut self, legacy: Arc<dyn LegacyBackend>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub async fn generate_comparison_responses(
        &self,
        document: &str,
        context: &RequestContext,
    ) -> Result<ComparisonResponses, GenerationError> {
        if document.trim().is_empty() {
            return Err(GenerationError::EmptyDocument);
        }

        match tokio::time::timeout(
            self.config.primary_timeout,
            self.generate_primary(document, context),
        )
        .await
        {
            Ok(Ok(responses)) => {
                info!(
                    session_id = ?context.session_id,
                    backend_response_id = ?responses.backend_response_id,
                    "Generated comparison responses from provider"
                );
                return Ok(responses);
            }
            Ok(Err(e)) => {
                warn!(
                    session_id = ?context.session_id,
                    error = %e,
                    "Primary generation failed, using simulated responses"
                );
            }
            Err(_) => {
                warn!(
                    session_id = ?context.session_id,
                    timeout_secs = self.config.primary_timeout.as_secs_f64(),
                    "Primary generation timed out, using simulated responses"
                );
            }
        }

        let mut rng = rand::thread_rng();
        simulate_responses(document, &mut rng)
    }

    async fn generate_primary(
        &self,
        document: &str,
        context: &RequestContext,
    ) -> Result<ComparisonResponses> {
        let (assistant, advisor) = self
            .agents
            .as_ref()
            .ok_or_else(|| anyhow!("No completion provider configured"))?;

        let backend_response_id = match &self.legacy {
            Some(legacy) => Some(probe_legacy(legacy.as_ref(), document, context).await?),
            None => None,
        };

        let base = &self.config.model_config;
        let (response_a, response_b) = futures::future::try_join(
            assistant.respond(document, base),
            advisor.respond(document, base),
        )
        .await?;
        debug!(
            provider = assistant.provider_name(),
            model = %base.model,
            "Both completions succeeded"
        );

        Ok(ComparisonResponses {
            response_a,
            response_b,
            agent_a: assistant.persona().agent_name.to_string(),
            agent_b: advisor.persona().agent_name.to_string(),
            source: ResponseSource::Api,
            model: Some(base.model.clone()),
            backend_response_id,
        })
    }
}

async fn probe_legacy(
    legacy: &dyn LegacyBackend,
    document: &str,
    context: &RequestContext,
) -> Result<String> {
    let user_id = context.user_id.as_deref().unwrap_or("trainer-user");
    let legacy_session = legacy.create_session(user_id).await?;
    let reply = legacy.send_message(&legacy_session, document).await?;
    debug!(
        legacy_session = %legacy_session,
        response_id = %reply.response_id,
        reply_chars = reply.text.len(),
        "Legacy backend probe succeeded"
    );
    Ok(reply.response_id)
}

/// Builds both letters locally from the document's structure.
pub fn simulate_responses<R: Rng + ?Sized>(
    document: &str,
    rng: &mut R,
) -> Result<ComparisonResponses, GenerationError> {
    if document.trim().is_empty() {
        return Err(GenerationError::EmptyDocument);
    }

    let recipient = extract_recipient_name(document);
    let response_a = DOCUMENT_REQUEST.compose(&recipient, rng)?;
    let response_b = NEXT_STEPS.compose(&recipient, rng)?;

    Ok(ComparisonResponses {
        response_a,
        response_b,
        agent_a: format!(
            "{}{}",
            Persona::document_assistant().agent_name,
            SIMULATED_SUFFIX
        ),
        agent_b: format!("{}{}", Persona::legal_advisor().agent_name, SIMULATED_SUFFIX),
        source: ResponseSource::Simulated,
        model: None,
        backend_response_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::LegacyError, legacy_backend::{GradeSubmission, LegacyReply}};
    use rand::{SeedableRng, rngs::StdRng};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOCUMENT: &str = "Hi Manny,\nThe title company found an old lien.\nThank you,\nDavid Kim\n(978) 555-8473";

    /// Answers by persona temperature; fails for the temperatures listed in `fail_at`.
    struct ScriptedModel {
        calls: AtomicUsize,
        fail_at: Vec<f64>,
        delay: Duration,
    }

    impl ScriptedModel {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at: vec![],
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl ConversationModel for ScriptedModel {
        async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let temperature = config.temperature.unwrap_or_default();
            if self.fail_at.contains(&temperature) {
                return Err(anyhow!("provider error at {temperature}"));
            }
            Ok(format!("t={temperature}: {}", prompt.len()))
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    struct StubLegacy {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl LegacyBackend for StubLegacy {
        async fn create_session(&self, _user_id: &str) -> Result<String, LegacyError> {
            if self.fail {
                Err(LegacyError::Authentication)
            } else {
                Ok("legacy-session".to_string())
            }
        }

        async fn send_message(
            &self,
            _session_id: &str,
            _content: &str,
        ) -> Result<LegacyReply, LegacyError> {
            Ok(LegacyReply {
                response_id: "backend-123".to_string(),
                text: "ok".to_string(),
            })
        }

        async fn submit_grade(&self, _submission: &GradeSubmission) -> Result<(), LegacyError> {
            Ok(())
        }

        async fn ping(&self) -> bool {
            !self.fail
        }
    }

    #[tokio::test]
    async fn test_primary_path_tags_api() {
        let model = Arc::new(ScriptedModel::ok());
        let generator = ResponseGenerator::new(Some(model.clone()), GeneratorConfig::default());

        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(responses.source, ResponseSource::Api);
        assert!(!responses.is_simulated());
        assert_eq!(responses.response_a, format!("t=0.3: {}", DOCUMENT.len()));
        assert_eq!(responses.response_b, format!("t=0.7: {}", DOCUMENT.len()));
        assert_eq!(responses.agent_a, "compose_agent");
        assert_eq!(responses.agent_b, "research_agent");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_one_failed_call_falls_back_for_both() {
        let model = Arc::new(ScriptedModel {
            fail_at: vec![0.7],
            ..ScriptedModel::ok()
        });
        let generator = ResponseGenerator::new(Some(model), GeneratorConfig::default());

        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();

        assert!(responses.is_simulated());
        assert!(responses.response_a.starts_with("Dear David Kim,"));
        assert!(responses.response_b.starts_with("Dear David Kim,"));
        assert_eq!(responses.agent_a, "compose_agent_simulated");
    }

    #[tokio::test]
    async fn test_missing_model_is_simulated() {
        let generator = ResponseGenerator::new(None, GeneratorConfig::default());
        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(responses.source, ResponseSource::Simulated);
        assert!(responses.model.is_none());
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let model = Arc::new(ScriptedModel {
            delay: Duration::from_millis(500),
            ..ScriptedModel::ok()
        });
        let config = GeneratorConfig::default().with_timeout(Duration::from_millis(20));
        let generator = ResponseGenerator::new(Some(model), config);

        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();
        assert!(responses.is_simulated());
    }

    #[tokio::test]
    async fn test_legacy_probe_failure_skips_provider() {
        let model = Arc::new(ScriptedModel::ok());
        let generator = ResponseGenerator::new(Some(model.clone()), GeneratorConfig::default())
            .with_legacy_backend(Arc::new(StubLegacy { fail: true }));

        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();

        assert!(responses.is_simulated());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_legacy_probe_success_records_backend_id() {
        let generator =
            ResponseGenerator::new(Some(Arc::new(ScriptedModel::ok())), GeneratorConfig::default())
                .with_legacy_backend(Arc::new(StubLegacy { fail: false }));

        let responses = generator
            .generate_comparison_responses(DOCUMENT, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(responses.source, ResponseSource::Api);
        assert_eq!(responses.backend_response_id.as_deref(), Some("backend-123"));
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let generator = ResponseGenerator::new(None, GeneratorConfig::default());
        let err = generator
            .generate_comparison_responses("  \n ", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyDocument));
    }

    #[test]
    fn test_simulated_responses_always_differ() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let responses = simulate_responses(DOCUMENT, &mut rng).unwrap();
            assert!(!responses.response_a.is_empty());
            assert!(!responses.response_b.is_empty());
            assert_ne!(responses.response_a, responses.response_b);
        }
    }

    #[test]
    fn test_config_validation() {
        let config = GeneratorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.with_timeout(Duration::ZERO).validate().is_err());
    }
}
