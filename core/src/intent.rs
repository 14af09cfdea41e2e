use std::sync::Arc;

use anyhow::{ensure, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, Embedder};
use crate::llm::LanguageModel;
use crate::messages::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    TenantDetails,
    ListRunning,
    ListStopped,
    StopAll,
    StartAll,
    Unknown,
}

/// Hand-written anchor phrases per intent. Order matters only for ties.
pub const CANONICAL_EXAMPLES: &[(Intent, &[&str])] = &[
    (
        Intent::ListRunning,
        &[
            "get all running resources",
            "show running resources",
            "show me active resources",
            "list all active services",
            "what resources are currently running?",
            "fetch all running instances",
            "get currently running systems",
            "display all running VMs",
            "running services list",
            "which resources are active?",
        ],
    ),
    (
        Intent::ListStopped,
        &[
            "get all stopped resources",
            "show stopped resources",
            "list all inactive services",
            "what resources are currently stopped?",
            "fetch all stopped instances",
            "get currently halted systems",
            "display stopped VMs",
            "stopped services list",
            "which resources are not running?",
        ],
    ),
    (
        Intent::StartAll,
        &[
            "start all stopped resources",
            "start all inactive resources",
            "boot up all stopped services",
            "power on all halted instances",
            "resume all stopped machines",
            "bring up everything that is currently stopped",
            "start all VMs that aren't running",
            "activate all idle resources",
            "restart all stopped nodes",
        ],
    ),
    (
        Intent::StopAll,
        &[
            "stop all resources",
            "stop all running resources",
            "stop all active services",
            "shut down all running resources",
            "power off all running instances",
            "halt all active machines",
            "shut everything down",
            "turn off all VMs",
            "deactivate currently running resources",
            "kill all running tasks",
        ],
    ),
    (
        Intent::TenantDetails,
        &[
            "tenant details",
            "get tenant details",
            "fetch tenant info",
            "retrieve tenant metadata",
            "show tenant information",
            "display tenant details",
            "give me tenant details",
            "output tenant info",
            "get tenant names",
            "list tenant IDs",
            "retrieve tenant configurations",
            "show all tenant attributes",
            "what are the tenant names?",
            "which tenant am I in?",
        ],
    ),
];

/// Maps a free-text utterance to an intent. Never fails: anything it cannot
/// place is `Intent::Unknown`.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Intent;
}

struct IndexedExample {
    intent: Intent,
    phrase: &'static str,
    vector: Vec<f32>,
}

/// Nearest canonical example by cosine similarity.
///
/// The canonical phrases are embedded once, on first use, and kept with the
/// classifier. The best-scoring example at or above the threshold wins; on a
/// tie the earlier example is kept.
pub struct SimilarityClassifier {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    examples: Vec<(Intent, &'static str)>,
    index: OnceCell<Vec<IndexedExample>>,
}

impl SimilarityClassifier {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        let examples = CANONICAL_EXAMPLES
            .iter()
            .flat_map(|(intent, phrases)| phrases.iter().map(move |p| (*intent, *p)))
            .collect();
        Self::with_examples(embedder, threshold, examples)
    }

    pub fn with_examples(
        embedder: Arc<dyn Embedder>,
        threshold: f32,
        examples: Vec<(Intent, &'static str)>,
    ) -> Self {
        Self { embedder, threshold, examples, index: OnceCell::new() }
    }

    async fn index(&self) -> Result<&[IndexedExample]> {
        let index = self
            .index
            .get_or_try_init(|| async {
                let phrases: Vec<String> =
                    self.examples.iter().map(|(_, p)| p.to_lowercase()).collect();
                let vectors = self.embedder.embed(&phrases).await?;
                ensure!(
                    vectors.len() == self.examples.len(),
                    "embedder returned {} vectors for {} examples",
                    vectors.len(),
                    self.examples.len()
                );
                let indexed: Vec<IndexedExample> = self
                    .examples
                    .iter()
                    .zip(vectors)
                    .map(|(&(intent, phrase), vector)| IndexedExample { intent, phrase, vector })
                    .collect();
                Ok::<_, anyhow::Error>(indexed)
            })
            .await?;
        Ok(index.as_slice())
    }

    async fn best_match(&self, utterance: &str) -> Result<Option<(Intent, &'static str, f32)>> {
        let index = self.index().await?;
        let input = self.embedder.embed(&[utterance.to_lowercase()]).await?;
        let Some(input) = input.first() else {
            return Ok(None);
        };

        let mut best: Option<(Intent, &'static str, f32)> = None;
        for example in index {
            let score = cosine_similarity(input, &example.vector);
            if score < self.threshold {
                continue;
            }
            // Strictly greater: ties keep the earlier example.
            if best.map_or(true, |(_, _, top)| score > top) {
                best = Some((example.intent, example.phrase, score));
            }
        }
        Ok(best)
    }
}

#[async_trait]
impl IntentClassifier for SimilarityClassifier {
    async fn classify(&self, utterance: &str) -> Intent {
        match self.best_match(utterance).await {
            Ok(Some((intent, phrase, score))) => {
                debug!(?intent, example = phrase, score, "Utterance matched canonical example");
                intent
            }
            Ok(None) => Intent::Unknown,
            Err(e) => {
                warn!(error = %e, "Intent classification failed, treating as unknown");
                Intent::Unknown
            }
        }
    }
}

const ROUTER_PROMPT: &str = "\
You are an intelligent command router. Based on the user's request, return the correct operation token from the list below.
Respond only with the token ID. Do not explain or add anything else.

Token mappings:
- tenant details -> t0
- get running resource -> t1
- get stopped resource -> t2
- stop running resources -> t3
- start stopped resources -> t4

If the user asks anything semantically similar, choose the appropriate token.
Examples:
- \"show me tenant info\" -> t0
- \"list active resources\" -> t1
- \"bring up stopped instances\" -> t4
- \"pause all services\" -> t3
- \"retrieve halted machines\" -> t2

If nothing fits, answer with the single word none.";

/// Routes through the language model instead of embeddings: the model is
/// asked for a single token, `t0`..`t4`.
pub struct LlmRouter {
    llm: Arc<dyn LanguageModel>,
    model_id: String,
}

impl LlmRouter {
    pub fn new(llm: Arc<dyn LanguageModel>, model_id: impl Into<String>) -> Self {
        Self { llm, model_id: model_id.into() }
    }

    pub fn parse_token(reply: &str) -> Intent {
        let token = reply.trim().trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        match token.as_str() {
            "t0" => Intent::TenantDetails,
            "t1" => Intent::ListRunning,
            "t2" => Intent::ListStopped,
            "t3" => Intent::StopAll,
            "t4" => Intent::StartAll,
            _ => Intent::Unknown,
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmRouter {
    async fn classify(&self, utterance: &str) -> Intent {
        let messages = [ChatMessage::user(utterance)];
        match self.llm.invoke(&messages, &self.model_id, Some(ROUTER_PROMPT)).await {
            Ok(reply) => {
                let intent = Self::parse_token(&reply);
                debug!(?intent, reply = %reply.trim(), "Router answered");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent router call failed, treating as unknown");
                Intent::Unknown
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use std::collections::HashMap;

    use super::*;
    use crate::embedding::{tokens, HashingEmbedder};
    use crate::llm::fake::ScriptedModel;

    fn classifier() -> SimilarityClassifier {
        SimilarityClassifier::new(Arc::new(HashingEmbedder::default()), 0.9)
    }

    #[test]
    fn every_intent_has_eight_to_fifteen_examples() {
        for (intent, phrases) in CANONICAL_EXAMPLES {
            assert!((8..=15).contains(&phrases.len()), "{:?} has {}", intent, phrases.len());
        }
    }

    #[test]
    fn canonical_vocabulary_has_no_slot_collisions() {
        let embedder = HashingEmbedder::default();
        let mut seen: HashMap<usize, String> = HashMap::new();
        for (_, phrases) in CANONICAL_EXAMPLES {
            for phrase in *phrases {
                for token in tokens(phrase) {
                    let (slot, _) = embedder.slot(&token);
                    if let Some(other) = seen.insert(slot, token.clone()) {
                        assert_eq!(other, token, "slot {} shared", slot);
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn stopped_wording_never_reads_as_running() {
        let classifier = classifier();
        assert_eq!(classifier.classify("get currently halted systems").await, Intent::ListStopped);
        assert_ne!(classifier.classify("show halted resources").await, Intent::ListRunning);
    }

    #[tokio::test]
    async fn every_canonical_example_maps_to_its_intent() {
        let classifier = classifier();
        for (intent, phrases) in CANONICAL_EXAMPLES {
            for phrase in *phrases {
                assert_eq!(classifier.classify(phrase).await, *intent, "phrase: {}", phrase);
            }
        }
    }

    #[tokio::test]
    async fn casing_and_punctuation_do_not_matter() {
        let classifier = classifier();
        assert_eq!(classifier.classify("STOP ALL RUNNING RESOURCES!").await, Intent::StopAll);
        assert_eq!(classifier.classify("Show me active resources.").await, Intent::ListRunning);
    }

    #[tokio::test]
    async fn unrelated_text_is_unknown() {
        let classifier = classifier();
        assert_eq!(classifier.classify("what is the weather in lisbon").await, Intent::Unknown);
        assert_eq!(classifier.classify("").await, Intent::Unknown);
    }

    // Maps phrases to hand-picked vectors so scores are exact.
    struct TableEmbedder(Vec<(&'static str, Vec<f32>)>);

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    self.0
                        .iter()
                        .find(|(k, _)| *k == t.as_str())
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| anyhow!("no vector for {}", t))
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn best_match_beats_first_match() {
        let embedder = Arc::new(TableEmbedder(vec![
            ("first", vec![0.92, 0.39, 0.0]),
            ("second", vec![1.0, 0.0, 0.0]),
            ("query", vec![1.0, 0.0, 0.0]),
        ]));
        let classifier = SimilarityClassifier::with_examples(
            embedder,
            0.9,
            vec![(Intent::ListStopped, "first"), (Intent::StopAll, "second")],
        );

        // Both clear the threshold; the closer one wins even though it is later.
        assert_eq!(classifier.classify("query").await, Intent::StopAll);
    }

    #[tokio::test]
    async fn ties_keep_the_earlier_example() {
        let embedder = Arc::new(TableEmbedder(vec![
            ("first", vec![1.0, 0.0]),
            ("second", vec![1.0, 0.0]),
            ("query", vec![1.0, 0.0]),
        ]));
        let classifier = SimilarityClassifier::with_examples(
            embedder,
            0.9,
            vec![(Intent::StartAll, "first"), (Intent::StopAll, "second")],
        );

        assert_eq!(classifier.classify("query").await, Intent::StartAll);
    }

    #[tokio::test]
    async fn embedder_failure_is_unknown() {
        let embedder = Arc::new(TableEmbedder(vec![("first", vec![1.0])]));
        let classifier = SimilarityClassifier::with_examples(
            embedder,
            0.9,
            vec![(Intent::StartAll, "first")],
        );

        assert_eq!(classifier.classify("missing").await, Intent::Unknown);
    }

    #[test]
    fn router_tokens_parse() {
        assert_eq!(LlmRouter::parse_token("t0"), Intent::TenantDetails);
        assert_eq!(LlmRouter::parse_token(" T1\n"), Intent::ListRunning);
        assert_eq!(LlmRouter::parse_token("`t2`"), Intent::ListStopped);
        assert_eq!(LlmRouter::parse_token("t3."), Intent::StopAll);
        assert_eq!(LlmRouter::parse_token("t4"), Intent::StartAll);
        assert_eq!(LlmRouter::parse_token("none"), Intent::Unknown);
        assert_eq!(LlmRouter::parse_token("t5"), Intent::Unknown);
    }

    #[tokio::test]
    async fn router_sends_only_the_utterance_with_its_prompt() {
        let model = Arc::new(ScriptedModel::replying(&["t3"]));
        let router = LlmRouter::new(model.clone(), "router-model");

        assert_eq!(router.classify("pause everything").await, Intent::StopAll);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages, vec![ChatMessage::user("pause everything")]);
        assert_eq!(calls[0].model_id, "router-model");
        assert!(calls[0].system_prompt.as_deref().unwrap().contains("command router"));
    }

    #[tokio::test]
    async fn router_failure_is_unknown() {
        let router = LlmRouter::new(Arc::new(ScriptedModel::failing("throttled")), "m");
        assert_eq!(router.classify("stop all").await, Intent::Unknown);
    }
}
