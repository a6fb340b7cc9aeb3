use super::{
    kv_cache_bytes, linear_activation_bytes, retained_elements_per_token, ArchitectureFamily,
    BatchShape, FamilyEstimate, MlpRetention,
};
use crate::{
    dtype::DType,
    estimate::math::{product, sum, MathProblem},
    profile::ModelProfile,
};

const ACTIVATION_LOW_FACTOR: f64 = 0.8;
const ACTIVATION_HIGH_FACTOR: f64 = 1.5;

/// Decoders whose attention bias (ALiBi) keeps them on the unfused attention
/// path: BLOOM, MPT.
///
/// On top of the linear terms, each layer materializes the score and the
/// softmax probability tensors, `B · heads · S²` elements each, so activation
/// memory grows **quadratically** with sequence length. Measured peaks vary
/// more on this path, hence the wider upper bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticAttentionFamily;

impl ArchitectureFamily for QuadraticAttentionFamily {
    fn name(&self) -> &'static str {
        "quadratic-attention"
    }

    fn activation_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        let mlp = if profile.gated_mlp() {
            MlpRetention::Gated
        } else {
            MlpRetention::Dense
        };
        let per_token = retained_elements_per_token(profile, profile.num_kv_heads(), mlp)?;
        let linear = linear_activation_bytes(profile, per_token, shape, dtype)?;
        let scores = product(&[
            2,
            profile.num_layers(),
            shape.batch_size,
            profile.num_attention_heads(),
            shape.seq_len,
            shape.seq_len,
            dtype.bytes(),
        ])?;
        FamilyEstimate::with_factors(
            sum([linear, scores])?,
            ACTIVATION_LOW_FACTOR,
            ACTIVATION_HIGH_FACTOR,
            format!(
                "{per_token} values/token/layer + materialized {}×{}² attention scores per layer in {dtype}",
                profile.num_attention_heads(),
                shape.seq_len
            ),
        )
    }

    fn kv_cache_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        Ok(FamilyEstimate::exact(
            kv_cache_bytes(profile, profile.num_kv_heads(), shape, dtype)?,
            format!("{} KV heads, unfused attention", profile.num_kv_heads()),
        ))
    }
}
