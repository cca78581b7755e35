//! Intent routing for user turns.
//!
//! A turn is classified into one of three execution paths: plain chat,
//! catalog retrieval, or product comparison. Obvious small-talk is matched
//! by regex fast paths without a model call; everything else goes through
//! the classifier model with JSON extraction, repair and ordered schema
//! validation. Classification never fails: exhausted attempts fall back to
//! retrieval over the raw utterance.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::llm::{ChatMessage, LlmService};

const ROUTER_PROMPT: &str = "\
You are the routing step of a phone-shop assistant. Classify the user's \
message and answer with exactly one JSON object, nothing else.\n\
Possible shapes:\n\
- {\"router\": \"chat\", \"infor\": \"<the message>\"} for greetings and small talk.\n\
- {\"router\": \"retrieval\", \"infor\": \"<what to search for>\"} for questions \
about products, prices, specifications or availability.\n\
- {\"router\": \"comparison\", \"products\": [\"<name>\", \"<name>\", ...]} when the \
user asks to compare two or more named products.\n\
Use the user's own wording for \"infor\". Do not add commentary.";

const ROUTER_STRICT_ADDITION: &str = "\n\
IMPORTANT: the previous answer was not valid. Respond with ONLY one valid \
JSON object in one of the three shapes above. No markdown fences, no \
single quotes, no trailing commas, no explanation.";

/// Classified execution path for a user turn. Exactly one variant per turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterDecision {
    Chat { info: String },
    Retrieval { info: String },
    Comparison { products: Vec<String> },
}

pub struct IntentRouter {
    llm: LlmService,
    max_retries: u32,
}

impl IntentRouter {
    pub fn new(llm: LlmService, max_retries: u32) -> Self {
        Self { llm, max_retries }
    }

    /// Classify an utterance. Never errors: parsing and validation failures
    /// are retried with a stricter instruction, and exhaustion falls back
    /// to retrieval over the trimmed utterance.
    pub async fn classify(&self, utterance: &str) -> RouterDecision {
        if let Some(decision) = fast_path(utterance) {
            tracing::info!("Router fast path matched, returning chat");
            return decision;
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            let system = if attempt == 0 {
                ROUTER_PROMPT.to_string()
            } else {
                format!("{}{}", ROUTER_PROMPT, ROUTER_STRICT_ADDITION)
            };
            let messages = vec![ChatMessage::system(system), ChatMessage::user(utterance)];

            let raw = match self.llm.invoke(messages).await {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!("Router model call failed on attempt {}: {}", attempt + 1, err);
                    last_error = err.to_string();
                    continue;
                }
            };

            match parse_and_validate(&raw) {
                Ok(decision) => {
                    tracing::info!("Router decided on attempt {}: {:?}", attempt + 1, decision);
                    return decision;
                }
                Err(err) => {
                    tracing::warn!(
                        "Router parse/validation failed on attempt {}: {}",
                        attempt + 1,
                        err
                    );
                    last_error = err;
                }
            }
        }

        tracing::error!(
            "Router exhausted all attempts, falling back to retrieval. Last error: {}",
            last_error
        );
        RouterDecision::Retrieval {
            info: utterance.trim().to_string(),
        }
    }
}

fn chat_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^\s*(chào|hi|hello|alo)\b",
            r"(?i)\b(cảm ơn|thank you|thanks)\b",
            r"(?i)\b(tạm biệt|bye)\b",
            r"(?i)\b(bạn là ai|bạn tên gì)\b",
            r"(?i)^\s*(oke|ok|tuyệt vời|tốt quá)\s*$",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn fast_path(utterance: &str) -> Option<RouterDecision> {
    chat_patterns()
        .iter()
        .any(|p| p.is_match(utterance))
        .then(|| RouterDecision::Chat {
            info: utterance.trim().to_string(),
        })
}

fn parse_and_validate(raw: &str) -> Result<RouterDecision, String> {
    if raw.trim().is_empty() {
        return Err("empty response from model".to_string());
    }

    // Take the first {...} block; a naked object without surrounding text
    // falls through unchanged.
    let json_text = extract_json_like(raw).unwrap_or_else(|| raw.trim().to_string());
    let repaired = repair_json(&json_text);

    let parsed: Value =
        serde_json::from_str(&repaired).map_err(|e| format!("json parse error: {}", e))?;

    validate(&parsed).ok_or_else(|| "does not match any router schema".to_string())
}

/// First `{...}` block in the text, with markdown code fences stripped.
fn extract_json_like(text: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    static OBJECT: OnceLock<Regex> = OnceLock::new();

    let fence = FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json|python)?\n?").expect("fence regex"));
    let object = OBJECT
        .get_or_init(|| Regex::new(r"(?s)\{(?:[^{}]|\{[^{}]*\})*\}").expect("object regex"));

    let cleaned = fence.replace_all(text, "").replace("```", "");
    object.find(&cleaned).map(|m| m.as_str().to_string())
}

/// Coerce common non-JSON artifacts before parsing: Python-style literals,
/// single-quoted strings and trailing commas. Heuristic by design.
fn repair_json(text: &str) -> String {
    static NONE: OnceLock<Regex> = OnceLock::new();
    static TRUE: OnceLock<Regex> = OnceLock::new();
    static FALSE: OnceLock<Regex> = OnceLock::new();
    static SINGLE_QUOTED: OnceLock<Regex> = OnceLock::new();
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();

    let mut t = text.trim().to_string();

    t = NONE
        .get_or_init(|| Regex::new(r"\bNone\b").expect("regex"))
        .replace_all(&t, "null")
        .into_owned();
    t = TRUE
        .get_or_init(|| Regex::new(r"\bTrue\b").expect("regex"))
        .replace_all(&t, "true")
        .into_owned();
    t = FALSE
        .get_or_init(|| Regex::new(r"\bFalse\b").expect("regex"))
        .replace_all(&t, "false")
        .into_owned();

    // Single-quoted keys and values bounded by structural characters.
    // Adjacent matches share a boundary character, so run to fixpoint.
    let single_quoted = SINGLE_QUOTED
        .get_or_init(|| Regex::new(r#"([:\[,{]\s*)'([^']*)'(\s*[,:\]}])"#).expect("regex"));
    loop {
        let replaced = single_quoted.replace_all(&t, "$1\"$2\"$3").into_owned();
        if replaced == t {
            break;
        }
        t = replaced;
    }

    t = TRAILING_COMMA
        .get_or_init(|| Regex::new(r",\s*([}\]])").expect("regex"))
        .replace_all(&t, "$1")
        .into_owned();

    t
}

/// Try the three decision schemas in a fixed order; first match wins.
fn validate(value: &Value) -> Option<RouterDecision> {
    validate_chat(value)
        .or_else(|| validate_retrieval(value))
        .or_else(|| validate_comparison(value))
}

fn validate_chat(value: &Value) -> Option<RouterDecision> {
    if value.get("router")?.as_str()? != "chat" {
        return None;
    }
    let info = value.get("infor")?.as_str()?;
    Some(RouterDecision::Chat {
        info: info.to_string(),
    })
}

fn validate_retrieval(value: &Value) -> Option<RouterDecision> {
    if value.get("router")?.as_str()? != "retrieval" {
        return None;
    }
    let info = value.get("infor")?.as_str()?;
    if info.trim().is_empty() {
        return None;
    }
    Some(RouterDecision::Retrieval {
        info: info.to_string(),
    })
}

fn validate_comparison(value: &Value) -> Option<RouterDecision> {
    if value.get("router")?.as_str()? != "comparison" {
        return None;
    }
    let products = value.get("products")?.as_array()?;

    let mut cleaned: Vec<String> = Vec::new();
    for product in products {
        let name = product.as_str()?.trim();
        if !name.is_empty() && !cleaned.iter().any(|existing| existing == name) {
            cleaned.push(name.to_string());
        }
    }
    if cleaned.len() < 2 {
        return None;
    }

    Some(RouterDecision::Comparison { products: cleaned })
}
