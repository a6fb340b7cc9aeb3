//! Hub `config.json` → [`ModelProfile`].
//!
//! Only the fields the estimator consumes are read. GPT-style key names
//! (`n_embd`, `n_layer`, `n_head`, `n_positions`, `n_inner`) and MPT-style
//! ones (`d_model`, `n_layers`, `n_heads`, `max_seq_len`, `expansion_ratio`)
//! are accepted in place of the Llama-style keys. A document may carry both
//! spellings; the Llama-style key wins.

use std::path::Path;

use serde::Deserialize;

use super::{ModelProfile, ProfileError};
use crate::dtype::DType;

/// Activations that imply a gated (three matrix) MLP.
const GATED_ACTIVATIONS: &[&str] = &["silu", "swiglu", "gelu_pytorch_tanh", "geglu"];

#[derive(Debug, Default, Deserialize)]
pub struct RawModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    pub hidden_size: Option<u64>,
    pub num_hidden_layers: Option<u64>,
    pub num_attention_heads: Option<u64>,
    pub num_key_value_heads: Option<u64>,
    pub head_dim: Option<u64>,
    pub intermediate_size: Option<u64>,
    pub vocab_size: Option<u64>,
    pub max_position_embeddings: Option<u64>,
    pub torch_dtype: Option<String>,
    pub tie_word_embeddings: Option<bool>,
    pub hidden_act: Option<String>,

    n_embd: Option<u64>,
    d_model: Option<u64>,
    n_layer: Option<u64>,
    n_layers: Option<u64>,
    num_layers: Option<u64>,
    n_head: Option<u64>,
    n_heads: Option<u64>,
    num_kv_heads: Option<u64>,
    multi_query_group_num: Option<u64>,
    n_inner: Option<u64>,
    ffn_hidden_size: Option<u64>,
    expansion_ratio: Option<u64>,
    n_positions: Option<u64>,
    seq_length: Option<u64>,
    max_seq_len: Option<u64>,
    activation_function: Option<String>,
    hidden_activation: Option<String>,
}

impl RawModelConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_value(raw: serde_json::Value) -> Result<Self, ProfileError> {
        Ok(serde_json::from_value(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn hidden_size(&self) -> Option<u64> {
        self.hidden_size.or(self.n_embd).or(self.d_model)
    }

    pub fn num_layers(&self) -> Option<u64> {
        self.num_hidden_layers
            .or(self.n_layer)
            .or(self.n_layers)
            .or(self.num_layers)
    }

    pub fn num_attention_heads(&self) -> Option<u64> {
        self.num_attention_heads.or(self.n_head).or(self.n_heads)
    }

    pub fn num_kv_heads(&self) -> Option<u64> {
        self.num_key_value_heads
            .or(self.num_kv_heads)
            .or(self.multi_query_group_num)
    }

    /// Explicit width first, then `expansion_ratio · hidden_size`.
    pub fn intermediate_size(&self) -> Option<u64> {
        self.intermediate_size
            .or(self.n_inner)
            .or(self.ffn_hidden_size)
            .or_else(|| self.expansion_ratio?.checked_mul(self.hidden_size()?))
    }

    pub fn max_seq_len(&self) -> Option<u64> {
        self.max_position_embeddings
            .or(self.n_positions)
            .or(self.seq_length)
            .or(self.max_seq_len)
    }

    pub fn activation(&self) -> Option<&str> {
        self.hidden_act
            .as_deref()
            .or(self.activation_function.as_deref())
            .or(self.hidden_activation.as_deref())
    }

    /// No declared activation means the Llama-style SiLU gate, except for
    /// `expansion_ratio` configs (MPT) whose MLP is a plain up/down pair.
    fn gated_mlp(&self) -> bool {
        match self.activation() {
            Some(act) => GATED_ACTIVATIONS.contains(&act.to_ascii_lowercase().as_str()),
            None => self.expansion_ratio.is_none(),
        }
    }
}

/// Turns raw config documents into profiles.
///
/// A parameter count read from checkpoint metadata can be supplied with
/// [`ProfileResolver::with_total_params`]; otherwise it is derived from the
/// dimensions and the profile records it as defaulted.
#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    total_params: Option<u64>,
}

impl ProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_total_params(mut self, total_params: u64) -> Self {
        self.total_params = Some(total_params);
        self
    }

    pub fn resolve(
        &self,
        model_id: &str,
        raw: &RawModelConfig,
    ) -> Result<ModelProfile, ProfileError> {
        let architecture = raw
            .architectures
            .first()
            .ok_or(ProfileError::MissingField("architectures"))?;
        let weight_dtype = raw
            .torch_dtype
            .as_deref()
            .map(str::parse::<DType>)
            .transpose()
            .map_err(|e| ProfileError::InvalidField {
                field: "torch_dtype",
                reason: e.to_string(),
            })?;

        let profile = ModelProfile::builder()
            .model_id(model_id)
            .architecture(architecture.as_str())
            .maybe_total_params(self.total_params)
            .num_layers(
                raw.num_layers()
                    .ok_or(ProfileError::MissingField("num_hidden_layers"))?,
            )
            .hidden_size(raw.hidden_size().ok_or(ProfileError::MissingField("hidden_size"))?)
            .num_attention_heads(
                raw.num_attention_heads()
                    .ok_or(ProfileError::MissingField("num_attention_heads"))?,
            )
            .maybe_num_kv_heads(raw.num_kv_heads())
            .maybe_head_dim(raw.head_dim)
            .maybe_intermediate_size(raw.intermediate_size())
            .vocab_size(raw.vocab_size.ok_or(ProfileError::MissingField("vocab_size"))?)
            .maybe_max_seq_len(raw.max_seq_len())
            .maybe_weight_dtype(weight_dtype)
            .tie_word_embeddings(raw.tie_word_embeddings.unwrap_or(false))
            .gated_mlp(raw.gated_mlp())
            .build()?;

        for field in profile.defaulted_fields() {
            crate::warn!(
                "{model_id}: config has no value for {field}; using an assumed default"
            );
        }
        Ok(profile)
    }

    pub fn resolve_str(&self, model_id: &str, raw: &str) -> Result<ModelProfile, ProfileError> {
        self.resolve(model_id, &RawModelConfig::from_json_str(raw)?)
    }

    pub fn resolve_value(
        &self,
        model_id: &str,
        raw: serde_json::Value,
    ) -> Result<ModelProfile, ProfileError> {
        self.resolve(model_id, &RawModelConfig::from_value(raw)?)
    }

    pub fn resolve_path(
        &self,
        model_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<ModelProfile, ProfileError> {
        self.resolve(model_id, &RawModelConfig::from_path(path)?)
    }
}

/// Shorthand for `ProfileResolver::new().resolve_value(..)`.
pub fn resolve_profile(
    model_id: &str,
    raw_config: serde_json::Value,
) -> Result<ModelProfile, ProfileError> {
    ProfileResolver::new().resolve_value(model_id, raw_config)
}
