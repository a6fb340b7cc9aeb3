use super::{
    kv_cache_bytes, linear_activation_bytes, retained_elements_per_token, ArchitectureFamily,
    BatchShape, FamilyEstimate, MlpRetention,
};
use crate::{dtype::DType, estimate::math::MathProblem, profile::ModelProfile};

/// Spread of measured peaks around the linear activation formula.
const ACTIVATION_LOW_FACTOR: f64 = 0.8;
const ACTIVATION_HIGH_FACTOR: f64 = 1.3;

/// Pre-norm decoders with grouped-query attention, a gated MLP and a fused
/// (flash / SDPA) attention kernel: Llama, Mistral, Qwen2/3, Gemma, Phi-3.
///
/// Activation memory is linear in sequence length; no `S²` score matrix is
/// materialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatedDecoderFamily;

/// Same attention as [`GatedDecoderFamily`] with a plain two-matrix MLP:
/// GPT-NeoX, GPT-J, GPT-2, Phi, StableLM, StarCoder2.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseDecoderFamily;

fn decoder_activations(
    profile: &ModelProfile,
    shape: BatchShape,
    dtype: DType,
    mlp: MlpRetention,
) -> Result<FamilyEstimate, MathProblem> {
    let per_token = retained_elements_per_token(profile, profile.num_kv_heads(), mlp)?;
    let bytes = linear_activation_bytes(profile, per_token, shape, dtype)?;
    FamilyEstimate::with_factors(
        bytes,
        ACTIVATION_LOW_FACTOR,
        ACTIVATION_HIGH_FACTOR,
        format!(
            "{per_token} values/token/layer × {} layers × {} tokens in {dtype}, fused attention",
            profile.num_layers(),
            shape.tokens()?
        ),
    )
}

fn decoder_kv_cache(
    profile: &ModelProfile,
    shape: BatchShape,
    dtype: DType,
) -> Result<FamilyEstimate, MathProblem> {
    let kv_heads = profile.num_kv_heads();
    Ok(FamilyEstimate::exact(
        kv_cache_bytes(profile, kv_heads, shape, dtype)?,
        format!(
            "{kv_heads} KV heads × {} dim × {} layers at batch {}, seq {} in {dtype}",
            profile.head_dim(),
            profile.num_layers(),
            shape.batch_size,
            shape.seq_len
        ),
    ))
}

impl ArchitectureFamily for GatedDecoderFamily {
    fn name(&self) -> &'static str {
        "gated-decoder"
    }

    fn activation_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        decoder_activations(profile, shape, dtype, MlpRetention::Gated)
    }

    fn kv_cache_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        decoder_kv_cache(profile, shape, dtype)
    }
}

impl ArchitectureFamily for DenseDecoderFamily {
    fn name(&self) -> &'static str {
        "dense-decoder"
    }

    fn activation_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        decoder_activations(profile, shape, dtype, MlpRetention::Dense)
    }

    fn kv_cache_memory(
        &self,
        profile: &ModelProfile,
        shape: BatchShape,
        dtype: DType,
    ) -> Result<FamilyEstimate, MathProblem> {
        decoder_kv_cache(profile, shape, dtype)
    }
}
