//! Architecture-agnostic component calculators.
//!
//! ```text
//! weights    full | lora   P · bytes(w)
//!            qlora         ⌈P · bits_q / 8⌉ + P_a · bytes(c)
//! optimizer                T · s_opt  (+ T · 4 with a master copy)
//! gradients                T · bytes(g)
//! logits                   B · S · V · 4
//! ```
//! `P` total params, `P_a` adapter params, `T` trainable params,
//! `w` storage dtype, `c` QLoRA compute dtype, `g` gradient dtype.
//!
//! Inputs are assumed validated by the caller; every function is total over
//! them and only fails on `u64` overflow.

use super::{
    component::{ComponentEstimate, ComponentKind, Confidence},
    config::EstimatorConfig,
    math::{ceil_bytes, product, sum, MathProblem},
    method::TrainingMethod,
};
use crate::{dtype::DType, profile::ModelProfile};

/// Loss is computed on fp32 logits whatever the training dtype.
pub const LOGITS_BYTES_PER_ELEMENT: u64 = 4;

/// fp32 master copy of a trainable weight.
pub const MASTER_WEIGHT_BYTES: u64 = 4;

/// Dtype of the trainable parameters and of the activations they produce.
pub fn training_dtype(
    profile: &ModelProfile,
    method: TrainingMethod,
    config: &EstimatorConfig,
) -> DType {
    match method {
        TrainingMethod::Full | TrainingMethod::Lora => profile.weight_dtype(),
        TrainingMethod::Qlora => config.qlora_compute_dtype,
    }
}

/// Parameters the optimizer updates.
pub fn trainable_params(
    profile: &ModelProfile,
    method: TrainingMethod,
    adapter_params: u64,
) -> u64 {
    match method {
        TrainingMethod::Full => profile.trainable_params(),
        TrainingMethod::Lora | TrainingMethod::Qlora => adapter_params,
    }
}

pub fn weights(
    profile: &ModelProfile,
    method: TrainingMethod,
    adapter_params: u64,
    config: &EstimatorConfig,
) -> Result<ComponentEstimate, MathProblem> {
    let total = profile.total_params();
    match method {
        TrainingMethod::Full | TrainingMethod::Lora => {
            let dtype = profile.weight_dtype();
            let bytes = product(&[total, dtype.bytes()])?;
            Ok(ComponentEstimate::exact(
                ComponentKind::Weights,
                bytes,
                format!("{} params in {dtype}", format_params(total)),
            ))
        }
        TrainingMethod::Qlora => {
            let quant = &config.quant;
            let adapter_dtype = config.qlora_compute_dtype;
            let adapter_bytes = product(&[adapter_params, adapter_dtype.bytes()])?;
            let bits = quant.bits_per_param();
            let base = ceil_bytes(total as f64 * bits / 8.0)?;
            // Double quantization is the smallest layout the base can take.
            let base_low = ceil_bytes(total as f64 * quant.double_quant_bits_per_param() / 8.0)?;
            let bytes = sum([base, adapter_bytes])?;
            Ok(ComponentEstimate::new(
                ComponentKind::Weights,
                bytes,
                sum([base_low, adapter_bytes])?,
                bytes,
                Confidence::High,
                format!(
                    "{} params in {}-bit NF4 ({bits:.2} bits/param) + {} adapter params in {adapter_dtype}",
                    format_params(total),
                    quant.bits,
                    format_params(adapter_params),
                ),
            ))
        }
    }
}

pub fn optimizer_state(
    trainable_params: u64,
    trainable_dtype: DType,
    config: &EstimatorConfig,
) -> Result<ComponentEstimate, MathProblem> {
    let optimizer = config.optimizer;
    let state = product(&[trainable_params, optimizer.state_bytes_per_param()])?;
    let master = config.master_weights.applies(trainable_dtype);
    let master_bytes = if master {
        product(&[trainable_params, MASTER_WEIGHT_BYTES])?
    } else {
        0
    };
    let mut rationale = format!(
        "{optimizer} over {} trainable params ({} B/param)",
        format_params(trainable_params),
        optimizer.state_bytes_per_param()
    );
    if master {
        rationale.push_str(" + fp32 master weights");
    }
    Ok(ComponentEstimate::exact(
        ComponentKind::OptimizerState,
        sum([state, master_bytes])?,
        rationale,
    ))
}

pub fn gradients(
    trainable_params: u64,
    trainable_dtype: DType,
    config: &EstimatorConfig,
) -> Result<ComponentEstimate, MathProblem> {
    let dtype = config.gradient_dtype.unwrap_or(trainable_dtype);
    Ok(ComponentEstimate::exact(
        ComponentKind::Gradients,
        product(&[trainable_params, dtype.bytes()])?,
        format!("{} gradients in {dtype}", format_params(trainable_params)),
    ))
}

pub fn logits_buffer(
    batch_size: u64,
    seq_len: u64,
    vocab_size: u64,
) -> Result<ComponentEstimate, MathProblem> {
    Ok(ComponentEstimate::exact(
        ComponentKind::LogitsBuffer,
        product(&[batch_size, seq_len, vocab_size, LOGITS_BYTES_PER_ELEMENT])?,
        format!("{batch_size} × {seq_len} tokens × {vocab_size} vocab in float32"),
    ))
}

/// `8030000000` → `8.03B`, `41943040` → `41.9M`.
pub fn format_params(count: u64) -> String {
    let n = count as f64;
    if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.1}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else {
        count.to_string()
    }
}
