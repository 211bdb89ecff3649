//! Parallel fan-out to multiple LLMs with clean-context synthesis and
//! worker scoring (spec §4.E).

use crate::error::SessionError;
use crate::judge::{judge, JudgeRequest, JudgeVerdict};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use zen_claw_core::{GatewayError, Message};
use zen_claw_provider::{ChatRequest, ProviderAdapter};

/// A synthesis is scored `>= 8` to earn a `best_roles` credit (spec §4.E
/// step 7).
const BEST_ROLE_THRESHOLD: f32 = 8.0;

#[derive(Debug, Clone)]
pub struct ConsensusRequest {
    pub prompt: String,
    pub role: String,
    /// Explicit worker provider names; empty means "use the default set".
    pub workers: Vec<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub use_judge: bool,
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub provider: String,
    pub response: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub synthesis: String,
    pub workers: Vec<WorkerResult>,
    pub scores: HashMap<String, f32>,
    pub judge: Option<JudgeVerdict>,
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    worker: String,
    score: f32,
    #[allow(dead_code)]
    feedback: String,
}

#[derive(Debug, Deserialize)]
struct ScoreBlock {
    scores: Vec<ScoreEntry>,
}

/// Per-(provider, model) running aggregate, copy-on-write persisted to
/// `consensus-stats.json` (spec §4.E step 7, §6 persisted state).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStats {
    pub total_tasks: u64,
    pub total_score: f64,
    pub avg_score: f64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_used: Option<OffsetDateTime>,
    #[serde(default)]
    pub best_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusStats {
    /// Keyed by `"{provider}/{model}"`.
    pub providers: HashMap<String, ProviderStats>,
}

pub struct ConsensusEngine {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default_workers: Vec<String>,
    arbiter_order: Vec<String>,
    stats_path: PathBuf,
    stats_lock: AsyncMutex<()>,
}

impl ConsensusEngine {
    pub fn new(
        providers: HashMap<String, Arc<dyn ProviderAdapter>>,
        default_workers: Vec<String>,
        arbiter_order: Vec<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        ConsensusEngine {
            providers,
            default_workers,
            arbiter_order,
            stats_path: data_dir.into().join("consensus-stats.json"),
            stats_lock: AsyncMutex::new(()),
        }
    }

    pub async fn generate(&self, request: ConsensusRequest) -> Result<ConsensusResult, GatewayError> {
        let worker_names = self.resolve_workers(&request.workers);
        if worker_names.len() < 2 {
            return Err(GatewayError::User(format!(
                "consensus requires at least 2 usable workers, found {}",
                worker_names.len()
            )));
        }

        let worker_prompt = format!("{}\n\nTask:\n{}", request.role, request.prompt);

        let calls = worker_names.iter().cloned().map(|name| {
            let provider = self.providers.get(&name).cloned();
            let prompt = worker_prompt.clone();
            let max_tokens = request.max_tokens;
            let temperature = request.temperature;
            tokio::spawn(async move { call_worker(name, provider, prompt, max_tokens, temperature).await })
        });

        let worker_results: Vec<WorkerResult> = join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap_or_else(|e| WorkerResult {
                provider: "unknown".to_string(),
                response: String::new(),
                duration_ms: 0,
                error: Some(format!("worker task panicked: {e}")),
            }))
            .collect();

        let usable: Vec<(String, String)> = worker_results
            .iter()
            .filter(|w| w.error.is_none() && !w.response.is_empty())
            .map(|w| (w.provider.clone(), w.response.clone()))
            .collect();

        if usable.len() < 2 {
            return Err(GatewayError::Internal(format!(
                "consensus produced {} usable responses out of {}",
                usable.len(),
                worker_results.len()
            )));
        }

        let judge_verdict = if request.use_judge {
            if let Some(arbiter) = self.first_available_arbiter() {
                Some(
                    judge(
                        arbiter.as_ref(),
                        JudgeRequest {
                            responses: usable.clone(),
                            task: request.prompt.clone(),
                            context: request.role.clone(),
                            criteria: request.criteria.clone(),
                        },
                    )
                    .await,
                )
            } else {
                warn!("use_judge requested but no arbiter provider is available");
                None
            }
        } else {
            None
        };

        let Some(arbiter) = self.first_available_arbiter() else {
            return Err(GatewayError::User("no arbiter provider available".to_string()));
        };

        let arbiter_prompt = build_arbiter_prompt(&request.prompt, &usable, judge_verdict.as_ref());
        let arbiter_request = ChatRequest::new("arbiter", vec![Message::user(arbiter_prompt)]);

        let (synthesis, scores) = match arbiter.chat(&arbiter_request).await {
            Ok(resp) => {
                let scores = parse_scores(&resp.content).unwrap_or_default();
                (resp.content, scores)
            }
            Err(e) => {
                warn!(error = %e, "arbiter call failed, returning unscored result");
                (String::new(), HashMap::new())
            }
        };

        self.persist_scores(&request.role, &scores).await?;

        Ok(ConsensusResult { synthesis, workers: worker_results, scores, judge: judge_verdict })
    }

    fn resolve_workers(&self, requested: &[String]) -> Vec<String> {
        let candidates: Vec<String> =
            if requested.is_empty() { self.default_workers.clone() } else { requested.to_vec() };
        candidates.into_iter().filter(|name| self.providers.contains_key(name)).collect()
    }

    fn first_available_arbiter(&self) -> Option<Arc<dyn ProviderAdapter>> {
        self.arbiter_order.iter().find_map(|name| self.providers.get(name).cloned())
    }

    /// Updates the running aggregate for every worker that received a
    /// score this round (spec §4.E step 7).
    async fn persist_scores(&self, role: &str, scores: &HashMap<String, f32>) -> Result<(), SessionError> {
        if scores.is_empty() {
            return Ok(());
        }

        let _guard = self.stats_lock.lock().await;
        let mut stats = self.load_stats().await.unwrap_or_default();

        for (provider, &score) in scores {
            let entry = stats.providers.entry(provider.clone()).or_default();
            entry.total_tasks += 1;
            entry.total_score += score as f64;
            entry.avg_score = entry.total_score / entry.total_tasks as f64;
            entry.last_used = Some(OffsetDateTime::now_utc());
            if score >= BEST_ROLE_THRESHOLD && !entry.best_roles.iter().any(|r| r == role) {
                entry.best_roles.push(role.to_string());
            }
        }

        self.save_stats(&stats).await
    }

    async fn load_stats(&self) -> Result<ConsensusStats, SessionError> {
        match tokio::fs::read(&self.stats_path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConsensusStats::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_stats(&self, stats: &ConsensusStats) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(stats)?;
        let tmp = self.stats_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.stats_path).await?;
        Ok(())
    }
}

async fn call_worker(
    name: String,
    provider: Option<Arc<dyn ProviderAdapter>>,
    prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> WorkerResult {
    let start = Instant::now();
    let Some(provider) = provider else {
        return WorkerResult {
            provider: name.clone(),
            response: String::new(),
            duration_ms: 0,
            error: Some(format!("provider {name} not registered")),
        };
    };

    let mut request = ChatRequest::new(name.clone(), vec![Message::user(prompt)]);
    request.max_tokens = max_tokens;
    request.temperature = temperature;

    match provider.chat(&request).await {
        Ok(resp) => {
            info!(provider = %name, "consensus worker completed");
            WorkerResult {
                provider: name,
                response: resp.content,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
            }
        }
        Err(e) => WorkerResult {
            provider: name,
            response: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
    }
}

fn build_arbiter_prompt(task: &str, responses: &[(String, String)], judge: Option<&JudgeVerdict>) -> String {
    let mut prompt = format!("Task:\n{task}\n\nWorker responses:\n");
    for (i, (provider, text)) in responses.iter().enumerate() {
        prompt.push_str(&format!("\n--- WORKER_{}_{} ---\n{text}\n", i + 1, provider));
    }
    if let Some(j) = judge {
        prompt.push_str(&format!("\nJudge pre-ranking: winner={}, confidence={}\n", j.winner, j.confidence));
    }
    prompt.push_str(
        "\nSynthesize the best answer from the above, then on its own line write \
         ---SCORES--- followed by a fenced JSON block: \
         ```json\n{\"scores\":[{\"worker\":<provider>,\"score\":1..10,\"feedback\":<string>}]}\n```",
    );
    prompt
}

/// Splits on the `---SCORES---` marker and JSON-decodes the trailing
/// fenced block (spec §4.E step 6). Returns `None` on any parse failure —
/// callers treat that as "unscored but valid result".
fn parse_scores(content: &str) -> Option<HashMap<String, f32>> {
    let (_, tail) = content.split_once("---SCORES---")?;
    let json_text = tail
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let block: ScoreBlock = serde_json::from_str(json_text).ok()?;
    Some(block.scores.into_iter().map(|s| (s.worker, s.score)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockProvider, Scripted};

    fn engine(
        providers: Vec<(&str, Vec<Scripted>)>,
        arbiter_script: Vec<Scripted>,
        data_dir: &std::path::Path,
    ) -> ConsensusEngine {
        let mut map: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for (name, script) in providers {
            map.insert(name.to_string(), Arc::new(MockProvider::new(name, script)));
        }
        map.insert("arbiter".to_string(), Arc::new(MockProvider::new("arbiter", arbiter_script)));
        ConsensusEngine::new(
            map,
            vec!["w1".to_string(), "w2".to_string(), "w3".to_string()],
            vec!["arbiter".to_string()],
            data_dir,
        )
    }

    #[tokio::test]
    async fn fewer_than_two_workers_is_a_user_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(vec![("w1", vec![Scripted::Text("a")])], vec![], dir.path());
        let err = engine
            .generate(ConsensusRequest {
                prompt: "p".to_string(),
                role: "role".to_string(),
                workers: vec!["w1".to_string()],
                max_tokens: None,
                temperature: None,
                use_judge: false,
                criteria: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::User(_)));
    }

    #[tokio::test]
    async fn happy_path_parses_scores_and_persists_best_roles() {
        let dir = tempfile::tempdir().unwrap();
        let arbiter_output = "synthesis text\n---SCORES---\n```json\n{\"scores\":[{\"worker\":\"w1\",\"score\":8,\"feedback\":\"good\"},{\"worker\":\"w2\",\"score\":6,\"feedback\":\"ok\"},{\"worker\":\"w3\",\"score\":9,\"feedback\":\"best\"}]}\n```";
        let engine = engine(
            vec![
                ("w1", vec![Scripted::Text("blueprint one")]),
                ("w2", vec![Scripted::Text("blueprint two")]),
                ("w3", vec![Scripted::Text("blueprint three")]),
            ],
            vec![Scripted::Text(arbiter_output)],
            dir.path(),
        );

        let result = engine
            .generate(ConsensusRequest {
                prompt: "design a cache".to_string(),
                role: "architect".to_string(),
                workers: vec!["w1".to_string(), "w2".to_string(), "w3".to_string()],
                max_tokens: None,
                temperature: None,
                use_judge: false,
                criteria: vec![],
            })
            .await
            .unwrap();

        assert_eq!(result.workers.len(), 3);
        assert_eq!(result.scores.get("w1"), Some(&8.0));
        assert_eq!(result.scores.get("w3"), Some(&9.0));
        assert!(result.synthesis.contains("synthesis text"));

        let stats = engine.load_stats().await.unwrap();
        assert!(stats.providers["w1"].best_roles.contains(&"architect".to_string()));
        assert!(stats.providers["w3"].best_roles.contains(&"architect".to_string()));
        assert!(!stats.providers["w2"].best_roles.contains(&"architect".to_string()));
        assert_eq!(stats.providers["w1"].total_tasks, 1);
    }

    #[tokio::test]
    async fn malformed_score_block_yields_unscored_but_valid_result() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            vec![("w1", vec![Scripted::Text("a")]), ("w2", vec![Scripted::Text("b")])],
            vec![Scripted::Text("synthesis with no score marker")],
            dir.path(),
        );

        let result = engine
            .generate(ConsensusRequest {
                prompt: "p".to_string(),
                role: "role".to_string(),
                workers: vec!["w1".to_string(), "w2".to_string()],
                max_tokens: None,
                temperature: None,
                use_judge: false,
                criteria: vec![],
            })
            .await
            .unwrap();

        assert!(result.scores.is_empty());
        assert!(result.synthesis.contains("synthesis"));
    }
}
