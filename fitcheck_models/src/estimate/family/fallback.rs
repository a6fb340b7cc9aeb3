use super::{
    kv_cache_bytes, linear_activation_bytes, retained_elements_per_token, ArchitectureFamily,
    BatchShape, FamilyEstimate, MlpRetention,
};
use crate::{
    dtype::DType,
    estimate::math::{div_ceil, MathProblem},
    profile::ModelProfile,
};

const ACTIVATION_LOW_FACTOR: f64 = 0.5;
const ACTIVATION_HIGH_FACTOR: f64 = 2.0;

/// Used for any architecture string the registry does not know.
///
/// Applies the decoder formulas with the attention head count standing in
/// for the KV head count, which over-states both activations and cache when
/// the real model uses grouped-query attention. Intervals are wide: the low
/// end of the KV cache assumes a single shared KV head.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackFamily;

impl ArchitectureFamily for FallbackFamily {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn is_fallback(&self) -> bool {
        true
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
        let per_token = retained_elements_per_token(profile, profile.num_attention_heads(), mlp)?;
        let bytes = linear_activation_bytes(profile, per_token, shape, dtype)?;
        FamilyEstimate::with_factors(
            bytes,
            ACTIVATION_LOW_FACTOR,
            ACTIVATION_HIGH_FACTOR,
            format!(
                "unrecognized architecture '{}': {per_token} values/token/layer assuming multi-head attention",
                profile.architecture()
            ),
        )
    }

    fn kv_cache_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        let heads = profile.num_attention_heads();
        let bytes = kv_cache_bytes(profile, heads, shape, dtype)?;
        Ok(FamilyEstimate {
            bytes,
            low_bytes: div_ceil(bytes, heads),
            high_bytes: bytes,
            rationale: format!(
                "unrecognized architecture '{}': {heads} attention heads used as KV heads",
                profile.architecture()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::family::{tests::llama_8b, GatedDecoderFamily};

    #[test]
    fn over_estimates_gqa_models() {
        let profile = llama_8b();
        let shape = BatchShape::new(4, 1024);
        let exact = GatedDecoderFamily
            .kv_cache_memory(&profile, shape, DType::BFloat16)
            .unwrap();
        let fallback = FallbackFamily
            .kv_cache_memory(&profile, shape, DType::BFloat16)
            .unwrap();
        assert_eq!(fallback.bytes, 4 * exact.bytes);
        assert!(fallback.low_bytes <= exact.bytes);

        let exact = GatedDecoderFamily
            .activation_memory(&profile, shape, DType::BFloat16)
            .unwrap();
        let fallback = FallbackFamily
            .activation_memory(&profile, shape, DType::BFloat16)
            .unwrap();
        assert!(fallback.bytes > exact.bytes);
        assert!(fallback.high_bytes - fallback.low_bytes > exact.high_bytes - exact.low_bytes);
    }
}
