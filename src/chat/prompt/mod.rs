
use std::fmt::Write as _;

use tracing::debug;

use super::link::QUOTE_PATH;
use crate::config::{ComparisonConfig, GuardrailConfig};
use crate::knowledge::KnowledgeDocument;
use crate::knowledge::ingest::{BASE_TRIM_ID_LABEL, IMAGE_URL_LABEL};

const GROUNDING_CLAUSE: &str = "\
당신은 자동차 구매 상담 AI입니다.
- 반드시 아래 [컨텍스트]에 제공된 차량 정보만을 근거로 답변하세요.
- 컨텍스트에 없는 가격, 사양, 옵션은 추측하지 말고 확인할 수 없다고 답하세요.
- 자동차와 관련 없는 질문에는 \"자동차 관련 질문에만 답변드릴 수 있습니다.\"라고 정중히 답하세요.
- 답변은 한국어로 작성하세요.";

/// How the answer should be laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMode {
    Single,
    Comparison { left: String, right: String },
    Description { label: String },
}

/// System and user prompt for one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
    pub mode: PromptMode,
    pub guardrail: Option<GuardrailConfig>,
}

pub struct PromptComposer {
    comparison: ComparisonConfig,
    guardrail: Option<GuardrailConfig>,
}

impl PromptComposer {
    #[inline]
    pub fn new(comparison: ComparisonConfig, guardrail: Option<GuardrailConfig>) -> Self {
        Self {
            comparison,
            guardrail,
        }
    }

    /// The comparable pair referenced by `query`, when it also contains a
    /// comparison keyword. Matching is case-insensitive.
    #[inline]
    pub fn detect_comparison(&self, query: &str) -> Option<(String, String)> {
        let query = query.to_lowercase();

        let has_keyword = self
            .comparison
            .keywords
            .iter()
            .any(|keyword| query.contains(&keyword.to_lowercase()));
        if !has_keyword {
            return None;
        }

        self.comparison
            .pairs
            .iter()
            .find(|(left, right)| {
                query.contains(&left.to_lowercase()) && query.contains(&right.to_lowercase())
            })
            .cloned()
    }

    /// Prompt for a text chat message, switching to comparison mode when the
    /// message compares a configured pair
    #[inline]
    pub fn compose_chat(&self, query: &str, documents: &[KnowledgeDocument]) -> ComposedPrompt {
        let mode = match self.detect_comparison(query) {
            Some((left, right)) => PromptMode::Comparison { left, right },
            None => PromptMode::Single,
        };
        debug!("Composing chat prompt in {:?} mode", mode);

        let mut system = format!("{}\n\n", GROUNDING_CLAUSE);
        match &mode {
            PromptMode::Comparison { left, right } => {
                let _ = write!(
                    system,
                    "[비교 답변 형식]\n사용자가 {left}와(과) {right}의 비교를 요청했습니다. \
                     답변을 다음 두 섹션으로 나누어 같은 항목(가격, 트림, 주요 사양, 옵션) 순서로 작성하고, \
                     마지막에 어떤 사용자에게 어느 차량이 맞는지 한두 문장으로 정리하세요.\n\n\
                     ## {left}\n{}\n\n## {right}\n{}",
                    link_contract(Some(left)),
                    link_contract(Some(right)),
                );
            }
            _ => system.push_str(&link_contract(None)),
        }

        ComposedPrompt {
            system,
            user: user_prompt(&format!("[질문]\n{}", query), documents),
            mode,
            guardrail: self.guardrail.clone(),
        }
    }

    /// Prompt describing one identified vehicle. Never uses comparison mode.
    #[inline]
    pub fn compose_description(
        &self,
        label: &str,
        documents: &[KnowledgeDocument],
    ) -> ComposedPrompt {
        let system = format!(
            "{}\n\n[차량 소개 형식]\n사용자가 보낸 사진 속 차량은 '{}'(으)로 식별되었습니다. \
             이 차량 한 대만 소개하고 가격, 트림, 주요 특징을 간결하게 정리하세요.\n\n{}",
            GROUNDING_CLAUSE,
            label,
            link_contract(Some(label)),
        );

        ComposedPrompt {
            system,
            user: user_prompt(
                &format!("[요청]\n사진 속 차량 '{}'에 대해 소개해 주세요.", label),
                documents,
            ),
            mode: PromptMode::Description {
                label: label.to_string(),
            },
            guardrail: self.guardrail.clone(),
        }
    }
}

/// Instructions for the clickable image link, optionally scoped to one vehicle
fn link_contract(vehicle: Option<&str>) -> String {
    let heading = vehicle.map_or_else(
        || "[이미지 링크 규칙]".to_string(),
        |name| format!("[{} 이미지 링크 규칙]", name),
    );
    let subject = vehicle.map_or_else(|| "추천하는 차량".to_string(), |name| name.to_string());

    format!(
        "{heading}\n\
         - 컨텍스트에서 {subject}의 `{IMAGE_URL_LABEL}` 값과 `{BASE_TRIM_ID_LABEL}` 값을 찾으세요.\n\
         - 두 값을 사용해 다음 형식의 링크를 정확히 한 번 포함하세요.\n\
         [![<차량명>](<{IMAGE_URL_LABEL}>)]({QUOTE_PATH}?trimId=<{BASE_TRIM_ID_LABEL}>)\n\
         - 이미지 URL을 링크 없이 그대로 노출하지 마세요."
    )
}

fn user_prompt(request: &str, documents: &[KnowledgeDocument]) -> String {
    let mut prompt = String::from("[컨텍스트]\n");

    if documents.is_empty() {
        prompt.push_str("(검색된 차량 정보가 없습니다)\n");
    }
    for (i, document) in documents.iter().enumerate() {
        let _ = write!(
            prompt,
            "[문서 {}] (출처: {})\n{}\n\n",
            i + 1,
            document.source,
            document.content
        );
    }

    prompt.push('\n');
    prompt.push_str(request);
    prompt
}
