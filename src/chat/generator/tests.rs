use super::*;
use crate::RagError;
use crate::chat::prompt::PromptMode;
use crate::config::GuardrailConfig;
use crate::model::ContentBlock;
use crate::testing::{ScriptedModel, guardrail_blocked};

fn prompt(guardrail: Option<GuardrailConfig>) -> ComposedPrompt {
    ComposedPrompt {
        system: "system text".to_string(),
        user: "user text".to_string(),
        mode: PromptMode::Single,
        guardrail,
    }
}

#[tokio::test]
async fn completed_text_and_request_shape() {
    let model = Arc::new(ScriptedModel::replying(&["답변입니다"]));
    let generator = ResponseGenerator::new(Arc::clone(&model) as _, "text-model".to_string());
    let guardrail = GuardrailConfig {
        id: "gr".to_string(),
        version: "DRAFT".to_string(),
        trace: true,
    };

    let result = generator
        .generate(&prompt(Some(guardrail.clone())), 2048, 0.3)
        .await
        .expect("generation should succeed");
    assert_eq!(result, Generation::Completed("답변입니다".to_string()));

    let request = &model.requests()[0];
    assert_eq!(request.model_id, "text-model");
    assert_eq!(request.system.as_deref(), Some("system text"));
    assert_eq!(
        request.messages[0].content,
        vec![ContentBlock::Text("user text".to_string())]
    );
    assert_eq!(request.inference.max_tokens, 2048);
    assert_eq!(request.guardrail, Some(guardrail));
}

#[tokio::test]
async fn guardrail_stop_reason_is_reported() {
    let model = Arc::new(ScriptedModel::new(vec![Ok(guardrail_blocked())]));
    let generator = ResponseGenerator::new(model, "text-model".to_string());

    let result = generator.generate(&prompt(None), 100, 0.0).await;
    assert!(matches!(result, Ok(Generation::GuardrailIntervened)));
}

#[tokio::test]
async fn model_error_is_generation_failure() {
    let model = Arc::new(ScriptedModel::new(vec![Err(RagError::Model(
        "503".to_string(),
    ))]));
    let generator = ResponseGenerator::new(Arc::clone(&model) as _, "text-model".to_string());

    let result = generator.generate(&prompt(None), 100, 0.0).await;
    assert!(matches!(result, Err(ChatError::GenerationFailed(_))));
    assert_eq!(model.calls(), 1);
}
