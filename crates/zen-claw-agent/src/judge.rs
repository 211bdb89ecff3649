//! Self-contained evaluator used by the Consensus Engine (spec §4.H).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zen_claw_provider::{ChatRequest, ProviderAdapter};

/// Temperature used for judge and arbiter calls: low for repeatability
/// (spec §4.H).
pub const JUDGE_TEMPERATURE: f32 = 0.3;

/// Confidence assigned when the judge falls back to the first response
/// because the LLM call failed or its output didn't parse (spec §4.H).
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub responses: Vec<(String, String)>, // (worker label, response text)
    pub task: String,
    pub context: String,
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub winner: String,
    pub scores: HashMap<String, f32>,
    pub confidence: f32,
    pub reasoning: String,
}

/// Wire shape the judge LLM is asked to emit as a JSON object.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    winner: String,
    scores: HashMap<String, f32>,
    confidence: f32,
    reasoning: String,
}

/// Runs a single judge LLM call over `request.responses` and parses its
/// verdict. Single-response input bypasses the LLM entirely (spec §4.H).
pub async fn judge(provider: &dyn ProviderAdapter, request: JudgeRequest) -> JudgeVerdict {
    if request.responses.len() == 1 {
        let (label, _) = &request.responses[0];
        return JudgeVerdict {
            winner: label.clone(),
            scores: HashMap::from([(label.clone(), 1.0)]),
            confidence: 1.0,
            reasoning: "single candidate, no judging needed".to_string(),
        };
    }

    let prompt = build_judge_prompt(&request);
    let chat_request = ChatRequest::new("judge", vec![zen_claw_core::Message::user(prompt)]);

    let fallback = || fallback_verdict(&request);

    match provider.chat(&chat_request).await {
        Ok(response) => parse_verdict(&response.content).unwrap_or_else(|| fallback()),
        Err(_) => fallback(),
    }
}

fn fallback_verdict(request: &JudgeRequest) -> JudgeVerdict {
    let winner = request.responses.first().map(|(label, _)| label.clone()).unwrap_or_default();
    JudgeVerdict {
        winner,
        scores: HashMap::new(),
        confidence: FALLBACK_CONFIDENCE,
        reasoning: "judge unavailable, defaulted to first response".to_string(),
    }
}

fn build_judge_prompt(request: &JudgeRequest) -> String {
    let mut prompt = format!("Task: {}\nContext: {}\n\nCandidate responses:\n", request.task, request.context);
    for (label, text) in &request.responses {
        prompt.push_str(&format!("\n--- {label} ---\n{text}\n"));
    }
    if !request.criteria.is_empty() {
        prompt.push_str(&format!("\nCriteria: {}\n", request.criteria.join(", ")));
    }
    prompt.push_str(
        "\nRespond with a single JSON object: \
         {\"winner\": <label>, \"scores\": {<label>: 0..1}, \"confidence\": 0..1, \"reasoning\": <string>}",
    );
    prompt
}

fn parse_verdict(content: &str) -> Option<JudgeVerdict> {
    let raw: RawVerdict = serde_json::from_str(content.trim()).ok()?;
    Some(JudgeVerdict { winner: raw.winner, scores: raw.scores, confidence: raw.confidence, reasoning: raw.reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;

    #[tokio::test]
    async fn single_response_bypasses_the_llm() {
        let provider = MockProvider::new("judge", vec![]);
        let verdict = judge(
            &provider,
            JudgeRequest {
                responses: vec![("W1".to_string(), "answer".to_string())],
                task: "t".to_string(),
                context: "".to_string(),
                criteria: vec![],
            },
        )
        .await;
        assert_eq!(verdict.winner, "W1");
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_judge_output_falls_back_to_first_response() {
        let provider = MockProvider::new("judge", vec![crate::test_support::Scripted::Text("not json")]);
        let verdict = judge(
            &provider,
            JudgeRequest {
                responses: vec![("W1".to_string(), "a".to_string()), ("W2".to_string(), "b".to_string())],
                task: "t".to_string(),
                context: "".to_string(),
                criteria: vec![],
            },
        )
        .await;
        assert_eq!(verdict.winner, "W1");
        assert_eq!(verdict.confidence, FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn well_formed_judge_output_parses() {
        let json = r#"{"winner":"W2","scores":{"W1":0.4,"W2":0.9},"confidence":0.8,"reasoning":"clearer"}"#;
        let provider = MockProvider::new("judge", vec![crate::test_support::Scripted::Text(json)]);
        let verdict = judge(
            &provider,
            JudgeRequest {
                responses: vec![("W1".to_string(), "a".to_string()), ("W2".to_string(), "b".to_string())],
                task: "t".to_string(),
                context: "".to_string(),
                criteria: vec![],
            },
        )
        .await;
        assert_eq!(verdict.winner, "W2");
        assert_eq!(verdict.scores["W2"], 0.9);
    }
}
