
use std::sync::{Arc, LazyLock};

use fancy_regex::Regex;
use tracing::{debug, info, warn};

use crate::model::{
    ContentBlock, ConverseRequest, ImageFormat, InferenceConfig, Message, ModelProvider, Role,
};

/// Token the model answers with when the picture shows no vehicle
pub const NOT_CAR_SENTINEL: &str = "NOT_CAR";

const IDENTIFY_PROMPT: &str = "\
당신은 자동차 식별 전문가입니다. 첨부된 이미지를 보고 어떤 차량인지 판단하세요.

1. 먼저 차량의 외관(그릴, 헤드램프, 엠블럼, 차체 형태)을 자유롭게 분석하세요.
2. 분석을 마친 뒤 마지막 줄에 반드시 다음 형식으로만 답하세요.
Final Answer: <브랜드> <모델명>

이미지에 차량이 없거나 차량을 식별할 수 없다면 마지막 줄에 다음과 같이 답하세요.
Final Answer: NOT_CAR

예시 1 (차량 이미지):
전면부에 수평형 LED 주간주행등과 파라메트릭 그릴이 보이고 측면 루프라인이 패스트백 형태입니다. 현대 엠블럼이 확인됩니다.
Final Answer: 현대 쏘나타

예시 2 (차량이 아닌 이미지):
이미지에는 잔디밭 위의 강아지가 보이며 차량으로 볼 수 있는 요소가 없습니다.
Final Answer: NOT_CAR";

static FINAL_ANSWER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)final\s+answer\s*[:：]").expect("valid regex"));

/// Outcome of identifying the vehicle in an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleLabel {
    Identified(String),
    NotCar,
}

impl VehicleLabel {
    #[inline]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Identified(label) => Some(label),
            Self::NotCar => None,
        }
    }
}

/// Extract the vehicle label from a reasoning-then-answer model output.
///
/// The last `Final Answer:` marker decides; a marker with nothing after it
/// is a failed identification.
#[inline]
pub fn parse_final_answer(output: &str) -> VehicleLabel {
    let candidate = match last_marker_end(output) {
        Some(end) => {
            let answer = output
                .get(end..)
                .and_then(|rest| rest.lines().map(str::trim).find(|line| !line.is_empty()));
            match answer {
                Some(answer) => answer,
                None => return VehicleLabel::NotCar,
            }
        }
        None if contains_sentinel(output) => return VehicleLabel::NotCar,
        None => match strip_reasoning(output) {
            Some(line) => line,
            None => return VehicleLabel::NotCar,
        },
    };

    let label = clean_label(candidate);
    if label.is_empty() || contains_sentinel(label) {
        VehicleLabel::NotCar
    } else {
        VehicleLabel::Identified(label.to_string())
    }
}

fn last_marker_end(output: &str) -> Option<usize> {
    FINAL_ANSWER_REGEX
        .find_iter(output)
        .filter_map(Result::ok)
        .last()
        .map(|m| m.end())
}

fn contains_sentinel(text: &str) -> bool {
    text.to_ascii_uppercase().contains(NOT_CAR_SENTINEL)
}

/// Reasoning comes first, so the answer is the last non-empty line that is
/// not a bare marker
fn strip_reasoning(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty() && !is_bare_marker(line))
}

fn is_bare_marker(line: &str) -> bool {
    FINAL_ANSWER_REGEX
        .find(line)
        .ok()
        .flatten()
        .is_some_and(|m| {
            m.start() == 0 && line.get(m.end()..).is_some_and(|rest| rest.trim().is_empty())
        })
}

fn clean_label(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | '`'))
        .trim()
        .trim_end_matches('.')
        .trim()
}

/// Multimodal identification of the vehicle shown in an image
pub struct VisionIdentifier {
    model: Arc<dyn ModelProvider>,
    model_id: String,
    inference: InferenceConfig,
}

impl VisionIdentifier {
    #[inline]
    pub fn new(model: Arc<dyn ModelProvider>, model_id: String, inference: InferenceConfig) -> Self {
        Self {
            model,
            model_id,
            inference,
        }
    }

    /// Identify the vehicle in `bytes`. Failures of any kind yield
    /// [`VehicleLabel::NotCar`].
    #[inline]
    pub async fn identify(&self, bytes: &[u8], mime_type: &str) -> VehicleLabel {
        let Some(format) = ImageFormat::from_mime_type(mime_type) else {
            warn!("Unsupported image MIME type {:?}, treating as not a car", mime_type);
            return VehicleLabel::NotCar;
        };

        if bytes.is_empty() {
            warn!("Empty image payload, treating as not a car");
            return VehicleLabel::NotCar;
        }

        let request = ConverseRequest {
            model_id: self.model_id.clone(),
            messages: vec![Message {
                role: Role::User,
                content: vec![
                    ContentBlock::Image {
                        format,
                        bytes: bytes.to_vec(),
                    },
                    ContentBlock::Text(IDENTIFY_PROMPT.to_string()),
                ],
            }],
            system: None,
            inference: self.inference,
            guardrail: None,
        };

        match self.model.converse(request).await {
            Ok(output) => {
                debug!("Vision model output: {}", output.text);
                let label = parse_final_answer(&output.text);
                info!("Identified vehicle: {:?}", label);
                label
            }
            Err(e) => {
                warn!("Vehicle identification failed: {}", e);
                VehicleLabel::NotCar
            }
        }
    }
}
