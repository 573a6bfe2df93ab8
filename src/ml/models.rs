//! Concrete demand model implementations

use super::{DemandPredictor, ModelMetadata, PredictorInput, NUMERIC_FEATURES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Pre-trained linear model with one-hot category and region effects.
///
/// Loaded from a JSON artifact exported by the offline training job.
/// Categories or regions unseen during training contribute no effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDemandModel {
    pub metadata: ModelMetadata,
    pub intercept: f64,
    /// Weights keyed by [`NUMERIC_FEATURES`] name
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub category_effects: HashMap<String, f64>,
    #[serde(default)]
    pub region_effects: HashMap<String, f64>,
    #[serde(skip)]
    identifier: String,
    #[serde(skip)]
    coefficients: [f64; 7],
}

impl LinearDemandModel {
    /// Load a model artifact from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading model artifact {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing model artifact {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut model: Self = serde_json::from_str(raw)?;
        model.prepare()?;
        Ok(model)
    }

    /// Replace the identifier stamped on published rows
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    fn prepare(&mut self) -> Result<()> {
        if let Some(unknown) = self
            .weights
            .keys()
            .find(|k| !NUMERIC_FEATURES.contains(&k.as_str()))
        {
            anyhow::bail!("unknown feature weight '{}'", unknown);
        }
        for (slot, name) in self.coefficients.iter_mut().zip(NUMERIC_FEATURES) {
            *slot = self.weights.get(name).copied().unwrap_or(0.0);
        }
        if self.identifier.is_empty() {
            self.identifier = self.metadata.identifier();
        }
        Ok(())
    }
}

impl DemandPredictor for LinearDemandModel {
    fn predict(&self, input: &PredictorInput) -> Result<f64> {
        let linear: f64 = input
            .numeric()
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum();
        let category = self.category_effects.get(&input.category).copied().unwrap_or(0.0);
        let region = self.region_effects.get(&input.region).copied().unwrap_or(0.0);

        Ok(self.intercept + linear + category + region)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
