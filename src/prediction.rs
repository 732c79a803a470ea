//! Gate for destinations proposed by an external prediction collaborator.
//!
//! Predictions are only consumed here. A proposal becomes a suggestion when
//! its destination passes the path validator and its confidence reaches the
//! configured threshold; anything else leaves the file untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filesystem::security::PathValidator;
use crate::model::{ActionType, FileRecord, Suggestion, SuggestionSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub destination: String,
    pub confidence: f64,
    pub explanation: String,
}

pub trait Predictor: Send + Sync {
    fn predict(&self, file: &FileRecord) -> Option<Prediction>;
}

/// Never predicts anything.
pub struct NoPredictor;

impl Predictor for NoPredictor {
    fn predict(&self, _file: &FileRecord) -> Option<Prediction> {
        None
    }
}

/// Returns the same proposal for every file.
pub struct FixedPredictor(pub Prediction);

impl Predictor for FixedPredictor {
    fn predict(&self, _file: &FileRecord) -> Option<Prediction> {
        Some(self.0.clone())
    }
}

pub struct PredictionGate {
    predictor: Arc<dyn Predictor>,
    validator: Arc<PathValidator>,
    threshold: f64,
}

impl PredictionGate {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        validator: Arc<PathValidator>,
        threshold: f64,
    ) -> Self {
        Self {
            predictor,
            validator,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Ask the predictor about `file` and return an accepted suggestion.
    pub fn suggest(&self, file: &FileRecord) -> Option<Suggestion> {
        let prediction = self.predictor.predict(file)?;
        self.accept(prediction)
    }

    pub fn accept(&self, prediction: Prediction) -> Option<Suggestion> {
        if !prediction.confidence.is_finite()
            || prediction.confidence <= 0.0
            || prediction.confidence > 1.0
            || prediction.confidence < self.threshold
        {
            tracing::debug!(
                "Prediction for '{}' below threshold ({:.2} < {:.2})",
                prediction.destination,
                prediction.confidence,
                self.threshold
            );
            return None;
        }

        let destination = match self.validator.validate(&prediction.destination) {
            Ok(destination) => destination,
            Err(e) => {
                tracing::debug!("Prediction '{}' rejected: {}", prediction.destination, e);
                return None;
            }
        };

        Some(Suggestion {
            destination,
            confidence: prediction.confidence,
            source: SuggestionSource::Prediction,
            action: ActionType::Move,
            reason: prediction.explanation,
            rule_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::config::OrganizerConfig;

    fn gate(root: &std::path::Path, prediction: Prediction) -> PredictionGate {
        let config = Arc::new(OrganizerConfig::for_root(root, root.join(".state")));
        PredictionGate::new(
            Arc::new(FixedPredictor(prediction)),
            Arc::new(PathValidator::new(config.clone())),
            config.confidence_threshold,
        )
    }

    fn prediction(destination: &str, confidence: f64) -> Prediction {
        Prediction {
            destination: destination.into(),
            confidence,
            explanation: "Similar files went here".into(),
        }
    }

    #[test]
    fn accepts_confident_valid_prediction() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = FileRecord::new("/in/a.txt", 1);
        let suggestion = gate(temp.path(), prediction("Documents/Notes", 0.85))
            .suggest(&file)
            .unwrap();
        assert_eq!(suggestion.source, SuggestionSource::Prediction);
        assert_eq!(suggestion.destination, "Documents/Notes");
        assert_eq!(suggestion.action, ActionType::Move);
    }

    #[test]
    fn low_confidence_is_dropped() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = FileRecord::new("/in/a.txt", 1);
        assert!(gate(temp.path(), prediction("Docs", 0.5)).suggest(&file).is_none());
        assert!(gate(temp.path(), prediction("Docs", f64::NAN)).suggest(&file).is_none());
        assert!(gate(temp.path(), prediction("Docs", 0.7)).suggest(&file).is_some());
    }

    #[test]
    fn invalid_destination_is_dropped() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = FileRecord::new("/in/a.txt", 1);
        assert!(gate(temp.path(), prediction("../outside", 0.99)).suggest(&file).is_none());
        assert!(gate(temp.path(), prediction("/etc", 0.99)).suggest(&file).is_none());
    }
}
