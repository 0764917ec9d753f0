use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use flowforge_core::error::{FlowforgeError, Result};
use flowforge_graph::node::IntentConfig;
use flowforge_graph::{DetectionMethod, PersonaMapping};

/// External intent scorer — the LLM-backed collaborator used by the
/// `llm` and `hybrid` detection methods. Returns a confidence per
/// persona agent id.
pub trait IntentScorer: Send + Sync + 'static {
    fn score(
        &self,
        input: &str,
        mappings: &[PersonaMapping],
    ) -> BoxFuture<'_, Result<HashMap<String, f64>>>;
}

/// Which persona answers this turn, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub selected_agent_id: String,
    pub confidence: f64,
    pub method_used: DetectionMethod,
}

/// Selects one persona from the mapping table for a user utterance.
pub struct IntentRouter {
    method: DetectionMethod,
    confidence_threshold: f64,
    default_agent: Option<String>,
}

impl IntentRouter {
    pub fn new(method: DetectionMethod, confidence_threshold: f64) -> Self {
        Self {
            method,
            confidence_threshold,
            default_agent: None,
        }
    }

    pub fn from_config(config: &IntentConfig) -> Self {
        Self {
            method: config.method,
            confidence_threshold: config.confidence_threshold,
            default_agent: config.default_agent.clone(),
        }
    }

    pub fn with_default_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.default_agent = Some(agent_id.into());
        self
    }

    /// Route an utterance to one persona.
    ///
    /// Selection: among personas whose confidence clears the threshold,
    /// the highest priority wins; ties keep the earlier mapping entry
    /// (mapping order is connection order). Below threshold everywhere,
    /// the configured default persona is returned; with no default, the
    /// first connected persona is returned and a warning logged.
    pub async fn route(
        &self,
        input: &str,
        mappings: &[PersonaMapping],
        scorer: Option<&dyn IntentScorer>,
    ) -> Result<RoutingDecision> {
        if mappings.is_empty() {
            return Err(FlowforgeError::Routing(
                "Persona router has no connected agents".to_string(),
            ));
        }

        let confidences = self.confidences(input, mappings, scorer).await?;

        let mut selected: Option<(&PersonaMapping, f64)> = None;
        for mapping in mappings {
            let confidence = confidences
                .get(&mapping.agent_id)
                .copied()
                .unwrap_or(0.0);
            if confidence < self.confidence_threshold {
                continue;
            }
            // Strictly-greater keeps the first mapping on priority ties.
            match selected {
                Some((best, _)) if mapping.priority <= best.priority => {}
                _ => selected = Some((mapping, confidence)),
            }
        }

        if let Some((mapping, confidence)) = selected {
            debug!(
                agent_id = %mapping.agent_id,
                confidence,
                priority = mapping.priority,
                "Persona selected"
            );
            return Ok(RoutingDecision {
                selected_agent_id: mapping.agent_id.clone(),
                confidence,
                method_used: self.method,
            });
        }

        // No persona cleared the threshold — fall back.
        if let Some(ref default_id) = self.default_agent {
            if mappings.iter().any(|m| m.agent_id == *default_id) {
                return Ok(RoutingDecision {
                    selected_agent_id: default_id.clone(),
                    confidence: confidences.get(default_id).copied().unwrap_or(0.0),
                    method_used: self.method,
                });
            }
            warn!(
                default_agent = %default_id,
                "Configured default persona is not connected"
            );
        }

        let first = &mappings[0];
        warn!(
            agent_id = %first.agent_id,
            "No persona cleared the threshold and no default configured, using first connected"
        );
        Ok(RoutingDecision {
            selected_agent_id: first.agent_id.clone(),
            confidence: confidences.get(&first.agent_id).copied().unwrap_or(0.0),
            method_used: self.method,
        })
    }

    async fn confidences(
        &self,
        input: &str,
        mappings: &[PersonaMapping],
        scorer: Option<&dyn IntentScorer>,
    ) -> Result<HashMap<String, f64>> {
        match self.method {
            DetectionMethod::Keywords => Ok(keyword_confidences(input, mappings)),
            DetectionMethod::Llm => match scorer {
                Some(s) => s.score(input, mappings).await,
                None => {
                    warn!("LLM detection configured but no scorer available");
                    Ok(HashMap::new())
                }
            },
            DetectionMethod::Hybrid => {
                let mut scores = match scorer {
                    Some(s) => s.score(input, mappings).await?,
                    None => {
                        warn!("Hybrid detection configured but no scorer available");
                        HashMap::new()
                    }
                };
                // Take the higher confidence per persona.
                for (agent_id, keyword_score) in keyword_confidences(input, mappings) {
                    let entry = scores.entry(agent_id).or_insert(0.0);
                    if keyword_score > *entry {
                        *entry = keyword_score;
                    }
                }
                Ok(scores)
            }
        }
    }
}

/// Keyword detection: any trigger occurring as a case-insensitive
/// substring of the utterance yields confidence 1.0 for that persona.
fn keyword_confidences(input: &str, mappings: &[PersonaMapping]) -> HashMap<String, f64> {
    let input_lower = input.to_lowercase();
    let mut confidences = HashMap::new();
    for mapping in mappings {
        let matched = mapping
            .triggers
            .iter()
            .any(|t| !t.is_empty() && input_lower.contains(&t.to_lowercase()));
        if matched {
            confidences.insert(mapping.agent_id.clone(), 1.0);
        }
    }
    confidences
}
