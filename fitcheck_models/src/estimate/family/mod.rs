//! Per-architecture activation and KV-cache math.
//!
//! A family answers two questions for a profile and a batch shape: how many
//! bytes the forward pass retains for backward, and how many bytes a key /
//! value cache occupies. Families are stateless and shared through the
//! [`registry::FamilyRegistry`].

use std::fmt::Debug;

use super::math::{ceil_bytes, div_ceil, product, sum, MathProblem};
use crate::{
    dtype::DType,
    profile::{ModelProfile, ProfileField},
};

pub mod decoder;
pub mod fallback;
pub mod quadratic;
pub mod registry;

pub use self::{
    decoder::{DenseDecoderFamily, GatedDecoderFamily},
    fallback::FallbackFamily,
    quadratic::QuadraticAttentionFamily,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub batch_size: u64,
    pub seq_len: u64,
}

impl BatchShape {
    pub fn new(batch_size: u64, seq_len: u64) -> Self {
        Self {
            batch_size,
            seq_len,
        }
    }

    pub fn tokens(&self) -> Result<u64, MathProblem> {
        product(&[self.batch_size, self.seq_len])
    }
}

/// Point estimate and interval produced by a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyEstimate {
    pub bytes: u64,
    pub low_bytes: u64,
    pub high_bytes: u64,
    pub rationale: String,
}

impl FamilyEstimate {
    /// `low = ⌈bytes · low_factor⌉`, `high = ⌈bytes · high_factor⌉`.
    pub fn with_factors(
        bytes: u64,
        low_factor: f64,
        high_factor: f64,
        rationale: impl Into<String>,
    ) -> Result<Self, MathProblem> {
        Ok(Self {
            bytes,
            low_bytes: ceil_bytes(bytes as f64 * low_factor)?,
            high_bytes: ceil_bytes(bytes as f64 * high_factor)?,
            rationale: rationale.into(),
        })
    }

    pub fn exact(bytes: u64, rationale: impl Into<String>) -> Self {
        Self {
            bytes,
            low_bytes: bytes,
            high_bytes: bytes,
            rationale: rationale.into(),
        }
    }
}

/// Fields most families read beyond the always-present dimensions.
pub const DEFAULT_REQUIRED_FIELDS: &[ProfileField] =
    &[ProfileField::NumKvHeads, ProfileField::IntermediateSize];

pub trait ArchitectureFamily: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Only the registry's designated fallback returns `true`.
    fn is_fallback(&self) -> bool {
        false
    }

    /// Profile fields whose values this family's formulas depend on. A
    /// defaulted field from this list lowers the confidence of the family's
    /// components.
    fn required_fields(&self) -> &'static [ProfileField] {
        DEFAULT_REQUIRED_FIELDS
    }

    /// Bytes retained across all layers for the backward pass, at `dtype`.
    fn activation_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem>;

    /// Bytes of a key/value cache covering `shape`, at `dtype`.
    fn kv_cache_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem>;

    /// Activations with gradient checkpointing: one hidden state per layer
    /// boundary plus the full activations of the layer being recomputed.
    ///
    /// ```text
    /// L · B · S · h · bytes  +  activation_memory / L
    /// ```
    fn checkpointed_activation_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        let full = self.activation_memory(profile, shape, dtype)?;
        let layers = profile.num_layers();
        let boundaries = product(&[
            layers,
            shape.batch_size,
            shape.seq_len,
            profile.hidden_size(),
            dtype.bytes(),
        ])?;
        Ok(FamilyEstimate {
            bytes: sum([boundaries, div_ceil(full.bytes, layers)])?,
            low_bytes: sum([boundaries, div_ceil(full.low_bytes, layers)])?,
            high_bytes: sum([boundaries, div_ceil(full.high_bytes, layers)])?,
            rationale: format!(
                "gradient checkpointing: {layers} layer boundaries + one recomputed layer ({})",
                full.rationale
            ),
        })
    }
}

/// `2 · L · kv_heads · head_dim · bytes · B · S`.
pub fn kv_cache_bytes(
    profile: &ModelProfile,
    kv_heads: u64,
    shape: BatchShape,
    dtype: DType,
) -> Result<u64, MathProblem> {
    product(&[
        2,
        profile.num_layers(),
        kv_heads,
        profile.head_dim(),
        dtype.bytes(),
        shape.batch_size,
        shape.seq_len,
    ])
}

/// How the feed-forward block is retained for backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlpRetention {
    /// Fused gate/up activation: only the activated intermediate is kept.
    Gated,
    /// Pre- and post-activation intermediates are both kept.
    Dense,
}

/// Elements retained per token per layer under memory-efficient attention.
///
/// ```text
/// 2·h                 inputs of the two norms
/// q + 2·kv            q, k, v projection outputs
/// q                   attention output (input of o_proj)
/// i | 2·i             MLP intermediate(s)
/// ```
pub fn retained_elements_per_token(
    profile: &ModelProfile,
    kv_heads: u64,
    mlp: MlpRetention,
) -> Result<u64, MathProblem> {
    let h = profile.hidden_size();
    let q = profile.q_dim();
    let kv = product(&[kv_heads, profile.head_dim()])?;
    let i = profile.intermediate_size();
    let mlp = match mlp {
        MlpRetention::Gated => i,
        MlpRetention::Dense => product(&[2, i])?,
    };
    sum([product(&[2, h])?, q, product(&[2, kv])?, q, mlp])
}

/// `L · B · S · elements · bytes`.
pub fn linear_activation_bytes(
    profile: &ModelProfile,
    elements_per_token: u64,
    shape: BatchShape,
    dtype: DType,
) -> Result<u64, MathProblem> {
    product(&[
        profile.num_layers(),
        shape.batch_size,
        shape.seq_len,
        elements_per_token,
        dtype.bytes(),
    ])
}
