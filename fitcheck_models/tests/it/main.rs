mod properties;
mod scenarios;

use fitcheck_devices::HardwareSpec;
use fitcheck_models::{
    AdapterConfig, DType, ModelProfile, TrainingMethod, TrainingSetup,
};

/// 8B decoder with grouped-query attention, shaped like Llama 3.1 8B.
pub fn llama_8b() -> ModelProfile {
    llama_8b_with_kv_heads(8, "LlamaForCausalLM")
}

pub fn llama_8b_with_kv_heads(kv_heads: u64, architecture: &str) -> ModelProfile {
    ModelProfile::builder()
        .model_id("meta-llama/Llama-3.1-8B")
        .architecture(architecture)
        .num_layers(32)
        .hidden_size(4096)
        .num_attention_heads(32)
        .num_kv_heads(kv_heads)
        .intermediate_size(14336)
        .vocab_size(128_000)
        .max_seq_len(8192)
        .weight_dtype(DType::BFloat16)
        .total_params(8_030_000_000)
        .build()
        .unwrap()
}

pub fn rtx_3090() -> HardwareSpec {
    HardwareSpec::from_gib("NVIDIA RTX 3090", 24.0, 1.2).unwrap()
}

pub fn setup(method: TrainingMethod, batch_size: u64, seq_len: u64) -> TrainingSetup {
    TrainingSetup::builder()
        .method(method)
        .batch_size(batch_size)
        .seq_len(seq_len)
        .maybe_adapter(method.requires_adapter().then(|| AdapterConfig::with_rank(16)))
        .build()
}
