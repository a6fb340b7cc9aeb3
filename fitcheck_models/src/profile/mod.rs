use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    dtype::DType,
    estimate::math::{product, sum, MathProblem},
};

pub mod resolve;

/// Context length assumed when a config document does not declare one.
pub const DEFAULT_MAX_SEQ_LEN: u64 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("missing required model profile field: {0}")]
    MissingField(&'static str),

    #[error("invalid model profile field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("num_attention_heads ({heads}) is not a multiple of num_kv_heads ({kv_heads})")]
    HeadMismatch { heads: u64, kv_heads: u64 },

    #[error("trainable parameters ({trainable}) exceed total parameters ({total})")]
    TrainableExceedsTotal { trainable: u64, total: u64 },

    #[error("failed to parse model config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read model config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Profile attributes that may be filled in with an assumed value when the
/// source document does not carry them. Estimates built on a defaulted field
/// are reported with low confidence.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum ProfileField {
    #[display("total_params")]
    TotalParams,
    #[display("num_kv_heads")]
    NumKvHeads,
    #[display("intermediate_size")]
    IntermediateSize,
    #[display("max_seq_len")]
    MaxSeqLen,
    #[display("weight_dtype")]
    WeightDtype,
}

/// Architecture and scale of one model. Read-only once built.
///
/// Invariants checked at construction: every dimension is non-zero,
/// `num_attention_heads` is a multiple of `num_kv_heads`, and
/// `trainable_params <= total_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    model_id: String,
    architecture: String,
    total_params: u64,
    trainable_params: u64,
    num_layers: u64,
    hidden_size: u64,
    num_attention_heads: u64,
    num_kv_heads: u64,
    head_dim: u64,
    intermediate_size: u64,
    vocab_size: u64,
    max_seq_len: u64,
    weight_dtype: DType,
    tie_word_embeddings: bool,
    gated_mlp: bool,
    defaulted: BTreeSet<ProfileField>,
}

#[bon::bon]
impl ModelProfile {
    /// Missing optional values are filled in and recorded in
    /// [`ModelProfile::defaulted_fields`]:
    ///
    /// * `num_kv_heads` → `num_attention_heads` (plain multi-head attention)
    /// * `intermediate_size` → `4 · hidden_size`
    /// * `max_seq_len` → [`DEFAULT_MAX_SEQ_LEN`]
    /// * `weight_dtype` → bfloat16
    /// * `total_params` → [`estimate_param_count`] over the dimensions
    ///
    /// `head_dim` falls back to `hidden_size / num_attention_heads` and
    /// `trainable_params` to `total_params`; neither is an assumption.
    #[builder]
    pub fn new(
        #[builder(into)] model_id: String,
        #[builder(into)] architecture: String,
        total_params: Option<u64>,
        trainable_params: Option<u64>,
        num_layers: u64,
        hidden_size: u64,
        num_attention_heads: u64,
        num_kv_heads: Option<u64>,
        head_dim: Option<u64>,
        intermediate_size: Option<u64>,
        vocab_size: u64,
        max_seq_len: Option<u64>,
        weight_dtype: Option<DType>,
        #[builder(default)] tie_word_embeddings: bool,
        #[builder(default = true)] gated_mlp: bool,
    ) -> Result<Self, ProfileError> {
        non_zero("num_layers", num_layers)?;
        non_zero("hidden_size", hidden_size)?;
        non_zero("num_attention_heads", num_attention_heads)?;
        non_zero("vocab_size", vocab_size)?;

        let intermediate_default = match intermediate_size {
            Some(_) => 0,
            None => fits("intermediate_size", product(&[4, hidden_size]))?,
        };

        let mut defaulted = BTreeSet::new();
        let mut or_default = |field: ProfileField, value: Option<u64>, default: u64| match value {
            Some(v) => v,
            None => {
                defaulted.insert(field);
                default
            }
        };

        let num_kv_heads = or_default(ProfileField::NumKvHeads, num_kv_heads, num_attention_heads);
        let intermediate_size = or_default(
            ProfileField::IntermediateSize,
            intermediate_size,
            intermediate_default,
        );
        let max_seq_len = or_default(ProfileField::MaxSeqLen, max_seq_len, DEFAULT_MAX_SEQ_LEN);

        non_zero("num_kv_heads", num_kv_heads)?;
        non_zero("intermediate_size", intermediate_size)?;
        non_zero("max_seq_len", max_seq_len)?;
        if num_attention_heads % num_kv_heads != 0 {
            return Err(ProfileError::HeadMismatch {
                heads: num_attention_heads,
                kv_heads: num_kv_heads,
            });
        }

        let head_dim = match head_dim {
            Some(d) => d,
            None if hidden_size % num_attention_heads == 0 => hidden_size / num_attention_heads,
            None => {
                return Err(ProfileError::InvalidField {
                    field: "head_dim",
                    reason: format!(
                        "not given and hidden_size ({hidden_size}) is not divisible by num_attention_heads ({num_attention_heads})"
                    ),
                })
            }
        };
        non_zero("head_dim", head_dim)?;
        // kv_dim <= q_dim, so both getters stay in range.
        fits("head_dim", product(&[num_attention_heads, head_dim]))?;

        let weight_dtype = weight_dtype.unwrap_or_else(|| {
            defaulted.insert(ProfileField::WeightDtype);
            DType::BFloat16
        });

        let total_params = match total_params {
            Some(p) => p,
            None => {
                defaulted.insert(ProfileField::TotalParams);
                fits(
                    "total_params",
                    estimate_param_count(&ParamShape {
                        num_layers,
                        hidden_size,
                        num_attention_heads,
                        num_kv_heads,
                        head_dim,
                        intermediate_size,
                        vocab_size,
                        tie_word_embeddings,
                        gated_mlp,
                    }),
                )?
            }
        };
        non_zero("total_params", total_params)?;

        let trainable_params = trainable_params.unwrap_or(total_params);
        if trainable_params > total_params {
            return Err(ProfileError::TrainableExceedsTotal {
                trainable: trainable_params,
                total: total_params,
            });
        }

        Ok(Self {
            model_id,
            architecture,
            total_params,
            trainable_params,
            num_layers,
            hidden_size,
            num_attention_heads,
            num_kv_heads,
            head_dim,
            intermediate_size,
            vocab_size,
            max_seq_len,
            weight_dtype,
            tie_word_embeddings,
            gated_mlp,
            defaulted,
        })
    }
}

impl ModelProfile {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Identifier used for family resolution, e.g. `LlamaForCausalLM`.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn total_params(&self) -> u64 {
        self.total_params
    }

    pub fn total_params_b(&self) -> f64 {
        self.total_params as f64 / 1e9
    }

    /// Parameters updated under full fine-tuning.
    pub fn trainable_params(&self) -> u64 {
        self.trainable_params
    }

    pub fn num_layers(&self) -> u64 {
        self.num_layers
    }

    pub fn hidden_size(&self) -> u64 {
        self.hidden_size
    }

    pub fn num_attention_heads(&self) -> u64 {
        self.num_attention_heads
    }

    pub fn num_kv_heads(&self) -> u64 {
        self.num_kv_heads
    }

    pub fn head_dim(&self) -> u64 {
        self.head_dim
    }

    pub fn intermediate_size(&self) -> u64 {
        self.intermediate_size
    }

    pub fn vocab_size(&self) -> u64 {
        self.vocab_size
    }

    pub fn max_seq_len(&self) -> u64 {
        self.max_seq_len
    }

    pub fn weight_dtype(&self) -> DType {
        self.weight_dtype
    }

    pub fn tie_word_embeddings(&self) -> bool {
        self.tie_word_embeddings
    }

    pub fn gated_mlp(&self) -> bool {
        self.gated_mlp
    }

    /// Width of the query projection output, `num_attention_heads · head_dim`.
    pub fn q_dim(&self) -> u64 {
        self.num_attention_heads * self.head_dim
    }

    /// Width of each of the key and value projection outputs.
    pub fn kv_dim(&self) -> u64 {
        self.num_kv_heads * self.head_dim
    }

    pub fn defaulted_fields(&self) -> &BTreeSet<ProfileField> {
        &self.defaulted
    }

    pub fn is_defaulted(&self, field: ProfileField) -> bool {
        self.defaulted.contains(&field)
    }

    pub fn any_defaulted(&self, fields: &[ProfileField]) -> bool {
        fields.iter().any(|f| self.defaulted.contains(f))
    }
}

/// Dimensions that determine a decoder's parameter count.
#[derive(Debug, Clone, Copy)]
pub struct ParamShape {
    pub num_layers: u64,
    pub hidden_size: u64,
    pub num_attention_heads: u64,
    pub num_kv_heads: u64,
    pub head_dim: u64,
    pub intermediate_size: u64,
    pub vocab_size: u64,
    pub tie_word_embeddings: bool,
    pub gated_mlp: bool,
}

/// Counts weights of a decoder-only transformer from its dimensions.
///
/// ```text
/// embeddings = V·h  (+ V·h for an untied LM head)
/// per layer  = h·(q + 2·kv) + q·h        attention projections
///            + (3 | 2)·h·i               gated | plain MLP
///            + 2·h                       norms
/// total      = embeddings + L·per_layer + h (final norm)
/// ```
/// Biases are ignored.
pub fn estimate_param_count(shape: &ParamShape) -> Result<u64, MathProblem> {
    let h = shape.hidden_size;
    let q = product(&[shape.num_attention_heads, shape.head_dim])?;
    let kv = product(&[shape.num_kv_heads, shape.head_dim])?;
    let i = shape.intermediate_size;

    let embeddings = product(&[
        shape.vocab_size,
        h,
        if shape.tie_word_embeddings { 1 } else { 2 },
    ])?;
    let attention = sum([
        product(&[h, sum([q, product(&[2, kv])?])?])?,
        product(&[q, h])?,
    ])?;
    let mlp = product(&[if shape.gated_mlp { 3 } else { 2 }, h, i])?;
    let per_layer = sum([attention, mlp, product(&[2, h])?])?;

    sum([embeddings, product(&[shape.num_layers, per_layer])?, h])
}

fn fits(field: &'static str, value: Result<u64, MathProblem>) -> Result<u64, ProfileError> {
    value.map_err(|e| ProfileError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ProfileError> {
    if value == 0 {
        return Err(ProfileError::InvalidField {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
