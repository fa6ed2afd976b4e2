//! The static table of selectable models.
//!
//! A registry is built once, either from the built-in table or from a YAML
//! file, and is never mutated afterwards.  It also owns the rules for the
//! per-response token limit: limits move in steps of [`TOKEN_STEP`] and are
//! clamped between [`MIN_MAX_TOKENS`] and the model's ceiling.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::ModelDescriptor;

/// Granularity of the token-limit control.
pub const TOKEN_STEP: u32 = 512;

/// Smallest token limit ever sent to the API.
pub const MIN_MAX_TOKENS: u32 = 512;

/// Upper bound on the token limit a fresh session starts with.
const PREFERRED_MAX_TOKENS: u32 = 32768;

/// Model selected when a session starts with the built-in registry.
pub const DEFAULT_MODEL_ID: &str = "mixtral-8x7b-32768";

/// Snap `requested` to the nearest multiple of [`TOKEN_STEP`] and clamp it into
/// `[MIN_MAX_TOKENS, ceiling]`.
///
/// A ceiling that is not itself a multiple of the step is rounded down to one,
/// so the result is always a multiple of the step and never exceeds the
/// ceiling the registry validated.
pub fn clamp_max_tokens(requested: u32, ceiling: u32) -> u32 {
    let upper = (ceiling / TOKEN_STEP * TOKEN_STEP).max(MIN_MAX_TOKENS);
    let snapped = requested.saturating_add(TOKEN_STEP / 2) / TOKEN_STEP * TOKEN_STEP;
    snapped.clamp(MIN_MAX_TOKENS, upper)
}

/// The token limit a session starts with for a model of the given ceiling.
pub fn default_max_tokens(ceiling: u32) -> u32 {
    clamp_max_tokens(PREFERRED_MAX_TOKENS.min(ceiling), ceiling)
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    default: Option<String>,
    models: Vec<ModelDescriptor>,
}

/// An ordered, read-only table of models keyed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    default_index: usize,
}

impl ModelRegistry {
    /// The models offered out of the box.
    pub fn builtin() -> Self {
        let models = vec![
            ModelDescriptor::new("gemma-7b-it", "Gemma-7b-it", 8192, "Google"),
            ModelDescriptor::new("llama2-70b-4096", "LLaMA2-70b-chat", 4096, "Meta"),
            ModelDescriptor::new("llama3-70b-8192", "LLaMA3-70b-8192", 8192, "Meta"),
            ModelDescriptor::new("llama3-8b-8192", "LLaMA3-8b-8192", 8192, "Meta"),
            ModelDescriptor::new(
                "mixtral-8x7b-32768",
                "Mixtral-8x7b-Instruct-v0.1",
                32768,
                "Mistral",
            ),
        ];
        let default_index = models
            .iter()
            .position(|m| m.id == DEFAULT_MODEL_ID)
            .unwrap_or(0);
        Self {
            models,
            default_index,
        }
    }

    /// Build a registry from a list of models.
    ///
    /// `default` names the model a session starts with; when absent the first
    /// model is used.
    ///
    /// # Errors
    ///
    /// Fails with a validation error when the list is empty, an id repeats, a
    /// ceiling is below [`MIN_MAX_TOKENS`], or `default` is not in the list.
    pub fn new(models: Vec<ModelDescriptor>, default: Option<&str>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::validation(
                "model registry must contain at least one model",
                Some("models".to_string()),
            ));
        }
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(Error::validation(
                    format!("duplicate model id {:?}", model.id),
                    Some("models".to_string()),
                ));
            }
            if model.token_ceiling < MIN_MAX_TOKENS {
                return Err(Error::validation(
                    format!(
                        "model {:?} has token ceiling {} below the minimum of {MIN_MAX_TOKENS}",
                        model.id, model.token_ceiling
                    ),
                    Some("token_ceiling".to_string()),
                ));
            }
        }
        let default_index = match default {
            Some(id) => models.iter().position(|m| m.id == id).ok_or_else(|| {
                Error::validation(
                    format!("default model {id:?} is not in the registry"),
                    Some("default".to_string()),
                )
            })?,
            None => 0,
        };
        Ok(Self {
            models,
            default_index,
        })
    }

    /// Parse a registry from YAML.
    ///
    /// ```yaml
    /// default: llama3-8b-8192
    /// models:
    ///   - id: llama3-8b-8192
    ///     display_name: LLaMA3-8b-8192
    ///     token_ceiling: 8192
    ///     vendor: Meta
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::new(file.models, file.default.as_deref())
    }

    /// Read and parse a YAML registry file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(path.as_ref()).map_err(|err| {
            Error::io(
                format!("failed to read model registry {}", path.as_ref().display()),
                err,
            )
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Look up a model by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no model has the given id.
    pub fn lookup(&self, id: &str) -> Result<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id).ok_or_else(|| {
            Error::not_found(
                format!("unknown model {id:?}"),
                Some("model".to_string()),
                Some(id.to_string()),
            )
        })
    }

    /// The model a new session starts with.
    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default_index]
    }

    /// Iterate over the models in display order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    /// Iterate over the model ids in display order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }

    /// Number of models in the registry.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Always false; a registry holds at least one model.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
