use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::dtype::DType;

/// Optimizer whose per-parameter state is held on the device.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Two fp32 moments.
    #[default]
    #[serde(rename = "adamw")]
    #[display("AdamW")]
    AdamW,
    /// Two 8-bit block-quantized moments.
    #[serde(rename = "adamw_8bit")]
    #[display("8-bit AdamW")]
    AdamW8bit,
    /// One fp32 momentum buffer.
    #[display("SGD (momentum)")]
    Sgd,
}

impl OptimizerKind {
    pub const fn state_bytes_per_param(self) -> u64 {
        match self {
            OptimizerKind::AdamW => 8,
            OptimizerKind::AdamW8bit => 2,
            OptimizerKind::Sgd => 4,
        }
    }
}

/// When the optimizer keeps an fp32 master copy of the trainable weights.
///
/// Under QLoRA the policy is applied to the adapter parameters only. The
/// frozen 4-bit base is never updated, so nothing of it is mirrored in fp32.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum MasterWeightPolicy {
    /// A master copy exists exactly when trainable weights are half precision.
    #[default]
    #[display("mixed precision")]
    MixedPrecision,
    #[display("always")]
    Always,
    #[display("never")]
    Never,
}

impl MasterWeightPolicy {
    pub fn applies(self, trainable_dtype: DType) -> bool {
        match self {
            MasterWeightPolicy::MixedPrecision => trainable_dtype.is_half(),
            MasterWeightPolicy::Always => true,
            MasterWeightPolicy::Never => false,
        }
    }
}

/// Block quantization of frozen base weights (NF4 by default).
#[derive(Builder, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantSpec {
    #[builder(default = 4)]
    pub bits: u32,

    /// Elements sharing one scale.
    #[builder(default = 64)]
    pub block_size: u64,

    /// Width of one block scale (fp32 absmax).
    #[builder(default = 4)]
    pub scale_bytes: u64,

    /// Quantize the block scales themselves to 8 bits, one fp32 per 256 scales.
    #[builder(default)]
    pub double_quant: bool,
}

impl Default for QuantSpec {
    fn default() -> Self {
        QuantSpec::builder().build()
    }
}

impl QuantSpec {
    /// Average stored bits per base parameter.
    ///
    /// ```text
    /// plain:        bits + 8·scale_bytes / block
    /// double quant: bits + 8 / block + 32 / (block · 256)
    /// ```
    pub fn bits_per_param(&self) -> f64 {
        if self.double_quant {
            return self.double_quant_bits_per_param();
        }
        let block = self.block_size.max(1) as f64;
        self.bits as f64 + (self.scale_bytes * 8) as f64 / block
    }

    pub fn double_quant_bits_per_param(&self) -> f64 {
        let block = self.block_size.max(1) as f64;
        self.bits as f64 + 8.0 / block + 32.0 / (block * 256.0)
    }
}

/// Every tunable assumption the estimator makes.
///
/// Loadable from JSON; absent keys take their defaults.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    #[builder(default)]
    pub optimizer: OptimizerKind,

    #[builder(default)]
    pub master_weights: MasterWeightPolicy,

    /// Gradient dtype. *Default = the trainable parameters' dtype*.
    pub gradient_dtype: Option<DType>,

    /// KV-cache dtype for the evaluation spike. *Default = compute dtype*.
    pub kv_cache_dtype: Option<DType>,

    #[builder(default)]
    pub quant: QuantSpec,

    /// Adapter and activation dtype under QLoRA.
    #[builder(default = DType::BFloat16)]
    pub qlora_compute_dtype: DType,

    /// Recompute block activations in the backward pass instead of retaining them.
    #[builder(default)]
    pub gradient_checkpointing: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::builder().build()
    }
}

impl EstimatorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
