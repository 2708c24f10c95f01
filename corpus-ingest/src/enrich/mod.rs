//! Metadata enrichment (C9): produces themes, weighted concepts, an overall
//! importance score, a short summary, emotional tone, and a domain label for
//! each semantic chunk. Delegates the actual judgment to a pluggable
//! [`EnrichmentProvider`] capability (mirroring [`crate::cleanup::AiCleanup`]'s
//! [`crate::cleanup::TextCompletionProvider`] split) and substitutes a
//! neutral fallback when the provider's response fails schema validation —
//! enrichment never fails the pipeline for one bad chunk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalLabel {
    Neutral,
    Joy,
    Sadness,
    Anger,
    Fear,
    Hope,
    Grief,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalMetadata {
    pub polarity: f64,
    pub primary_label: EmotionalLabel,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptualMetadata {
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub primary_domain: String,
}

/// The full enrichment response for one chunk, as returned by a provider
/// before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    pub themes: Vec<String>,
    pub conceptual_metadata: ConceptualMetadata,
    pub importance_score: f64,
    pub summary: String,
    pub emotional_metadata: EmotionalMetadata,
    pub domain_metadata: DomainMetadata,
}

impl EnrichmentResponse {
    /// Schema validation: themes 1-5, concepts importance in [0,1],
    /// importance_score in [0,1], summary 20-200 chars, polarity in [-1,1],
    /// intensity in [0,1].
    fn validate(&self) -> std::result::Result<(), String> {
        if self.themes.is_empty() || self.themes.len() > 5 {
            return Err(format!("themes count {} out of range 1..=5", self.themes.len()));
        }
        if self.conceptual_metadata.concepts.is_empty() || self.conceptual_metadata.concepts.len() > 10 {
            return Err(format!(
                "concept count {} out of range 1..=10",
                self.conceptual_metadata.concepts.len()
            ));
        }
        for concept in &self.conceptual_metadata.concepts {
            if !(0.0..=1.0).contains(&concept.importance) {
                return Err(format!("concept '{}' importance {} out of [0,1]", concept.name, concept.importance));
            }
        }
        if !(0.0..=1.0).contains(&self.importance_score) {
            return Err(format!("importance_score {} out of [0,1]", self.importance_score));
        }
        let summary_len = self.summary.chars().count();
        if !(20..=200).contains(&summary_len) {
            return Err(format!("summary length {summary_len} out of 20..=200"));
        }
        if !(-1.0..=1.0).contains(&self.emotional_metadata.polarity) {
            return Err(format!("polarity {} out of [-1,1]", self.emotional_metadata.polarity));
        }
        if !(0.0..=1.0).contains(&self.emotional_metadata.intensity) {
            return Err(format!("intensity {} out of [0,1]", self.emotional_metadata.intensity));
        }
        Ok(())
    }

    /// A safe substitute used when a provider's response fails validation
    /// after the configured retries, or when enrichment is skipped.
    pub fn neutral_fallback() -> Self {
        Self {
            themes: vec!["general".to_string()],
            conceptual_metadata: ConceptualMetadata {
                concepts: vec![Concept {
                    name: "general".to_string(),
                    importance: 0.1,
                }],
            },
            importance_score: 0.1,
            summary: "Content summary unavailable; neutral fallback applied.".to_string(),
            emotional_metadata: EmotionalMetadata {
                polarity: 0.0,
                primary_label: EmotionalLabel::Neutral,
                intensity: 0.0,
            },
            domain_metadata: DomainMetadata {
                primary_domain: "general".to_string(),
            },
        }
    }
}

/// Capability contract for whatever backend judges chunk content — local
/// heuristics or a hosted model.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, chunk_content: &str) -> Result<EnrichmentResponse>;
}

/// Reason a chunk was not enriched, recorded on the chunk row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSkippedReason {
    UserChoice,
}

pub struct ChunkEnricher {
    provider: Box<dyn EnrichmentProvider>,
    max_attempts: u32,
}

impl ChunkEnricher {
    pub fn new(provider: Box<dyn EnrichmentProvider>, max_attempts: u32) -> Self {
        Self { provider, max_attempts: max_attempts.max(1) }
    }

    /// Runs the provider up to `max_attempts` times, accepting the first
    /// schema-valid response. Falls back to a neutral object rather than
    /// failing the whole pipeline over one chunk.
    pub async fn enrich(&self, chunk_content: &str) -> EnrichmentResponse {
        for attempt in 1..=self.max_attempts {
            match self.provider.enrich(chunk_content).await {
                Ok(response) => match response.validate() {
                    Ok(()) => return response,
                    Err(reason) => {
                        tracing::warn!(attempt, %reason, "enrichment response failed schema validation");
                    }
                },
                Err(error) => {
                    tracing::warn!(attempt, %error, "enrichment provider call failed");
                }
            }
        }
        tracing::warn!("enrichment exhausted retries, substituting neutral fallback");
        EnrichmentResponse::neutral_fallback()
    }
}

/// Local, dependency-free enrichment: derives themes from the chunk's
/// most frequent words longer than three characters, sets importance from
/// content length, and stays emotionally neutral. No model call, so it
/// never fails schema validation — a drop-in default until a hosted
/// provider is wired in (same split [`crate::cleanup::AiCleanup`] uses for
/// cleanup).
pub struct LocalHeuristicEnrichmentProvider;

#[async_trait]
impl EnrichmentProvider for LocalHeuristicEnrichmentProvider {
    async fn enrich(&self, chunk_content: &str) -> Result<EnrichmentResponse> {
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for word in chunk_content.split_whitespace() {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
            if cleaned.chars().count() > 3 {
                *counts.entry(cleaned).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(5);

        let themes = if ranked.is_empty() {
            vec!["general".to_string()]
        } else {
            ranked.iter().take(3).map(|(w, _)| w.clone()).collect()
        };
        let total: usize = ranked.iter().map(|(_, c)| *c).sum();
        let concepts = if ranked.is_empty() {
            vec![Concept { name: "general".to_string(), importance: 0.1 }]
        } else {
            ranked
                .iter()
                .map(|(word, count)| Concept {
                    name: word.clone(),
                    importance: (*count as f64 / total.max(1) as f64).clamp(0.05, 1.0),
                })
                .collect()
        };

        let word_count = chunk_content.split_whitespace().count().max(1);
        let importance_score = (word_count as f64 / 400.0).clamp(0.1, 1.0);
        let summary: String = chunk_content.split_whitespace().take(25).collect::<Vec<_>>().join(" ");
        let summary = if summary.chars().count() < 20 {
            format!("{summary} (summary unavailable, excerpt shown above)")
        } else {
            summary
        };
        let summary: String = summary.chars().take(200).collect();

        Ok(EnrichmentResponse {
            themes,
            conceptual_metadata: ConceptualMetadata { concepts },
            importance_score,
            summary,
            emotional_metadata: EmotionalMetadata {
                polarity: 0.0,
                primary_label: EmotionalLabel::Neutral,
                intensity: 0.0,
            },
            domain_metadata: DomainMetadata { primary_domain: "general".to_string() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValidProvider;

    #[async_trait]
    impl EnrichmentProvider for AlwaysValidProvider {
        async fn enrich(&self, _chunk_content: &str) -> Result<EnrichmentResponse> {
            Ok(EnrichmentResponse {
                themes: vec!["grief".to_string(), "memory".to_string()],
                conceptual_metadata: ConceptualMetadata {
                    concepts: vec![Concept {
                        name: "loss".to_string(),
                        importance: 0.8,
                    }],
                },
                importance_score: 0.7,
                summary: "A reflection on grief and memory across twenty characters.".to_string(),
                emotional_metadata: EmotionalMetadata {
                    polarity: -0.6,
                    primary_label: EmotionalLabel::Grief,
                    intensity: 0.75,
                },
                domain_metadata: DomainMetadata {
                    primary_domain: "personal_essay".to_string(),
                },
            })
        }
    }

    struct AlwaysInvalidProvider;

    #[async_trait]
    impl EnrichmentProvider for AlwaysInvalidProvider {
        async fn enrich(&self, _chunk_content: &str) -> Result<EnrichmentResponse> {
            Ok(EnrichmentResponse {
                themes: vec![],
                conceptual_metadata: ConceptualMetadata { concepts: vec![] },
                importance_score: 1.5,
                summary: "too short".to_string(),
                emotional_metadata: EmotionalMetadata {
                    polarity: 0.0,
                    primary_label: EmotionalLabel::Neutral,
                    intensity: 0.0,
                },
                domain_metadata: DomainMetadata {
                    primary_domain: "general".to_string(),
                },
            })
        }
    }

    #[tokio::test]
    async fn valid_response_passes_through() {
        let enricher = ChunkEnricher::new(Box::new(AlwaysValidProvider), 3);
        let response = enricher.enrich("some chunk content").await;
        assert_eq!(response.themes.len(), 2);
        assert_eq!(response.domain_metadata.primary_domain, "personal_essay");
    }

    #[tokio::test]
    async fn invalid_response_falls_back_to_neutral_after_retries() {
        let enricher = ChunkEnricher::new(Box::new(AlwaysInvalidProvider), 2);
        let response = enricher.enrich("some chunk content").await;
        assert_eq!(response.domain_metadata.primary_domain, "general");
        assert_eq!(response.emotional_metadata.primary_label, EmotionalLabel::Neutral);
    }

    #[test]
    fn neutral_fallback_itself_is_schema_valid() {
        assert!(EnrichmentResponse::neutral_fallback().validate().is_ok());
    }

    #[tokio::test]
    async fn local_heuristic_provider_always_produces_a_schema_valid_response() {
        let provider = LocalHeuristicEnrichmentProvider;
        let response = provider
            .enrich("Grief returns in waves, each one a little gentler than the last, teaching patience.")
            .await
            .unwrap();
        assert!(response.validate().is_ok());
        assert!(!response.themes.is_empty());
        assert_eq!(response.emotional_metadata.primary_label, EmotionalLabel::Neutral);
    }

    #[tokio::test]
    async fn local_heuristic_provider_ranks_repeated_words_as_themes() {
        let provider = LocalHeuristicEnrichmentProvider;
        let response = provider
            .enrich("memory memory memory fades fades slowly over the years of waiting")
            .await
            .unwrap();
        assert_eq!(response.themes[0], "memory");
    }

    #[tokio::test]
    async fn local_heuristic_provider_falls_back_to_general_on_empty_content() {
        let provider = LocalHeuristicEnrichmentProvider;
        let response = provider.enrich("").await.unwrap();
        assert!(response.validate().is_ok());
        assert_eq!(response.themes, vec!["general".to_string()]);
    }
}
