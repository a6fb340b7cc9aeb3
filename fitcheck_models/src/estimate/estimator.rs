use std::sync::Arc;

use bon::Builder;
use fitcheck_devices::HardwareSpec;
use serde::{Deserialize, Serialize};

use super::{
    breakdown::VramBreakdown,
    calculators,
    component::{ComponentEstimate, ComponentKind, Confidence},
    config::EstimatorConfig,
    family::{registry::FamilyRegistry, ArchitectureFamily, BatchShape, FamilyEstimate},
    math::MathProblem,
    method::{AdapterConfig, TrainingMethod},
};
use crate::profile::{ModelProfile, ProfileField};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EstimateError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("seq_len must be at least 1")]
    ZeroSeqLen,

    #[error("seq_len {seq_len} exceeds the model's maximum sequence length {max_seq_len}")]
    SeqLenExceedsMax { seq_len: u64, max_seq_len: u64 },

    #[error("{method} training requires an adapter config")]
    AdapterRequired { method: TrainingMethod },

    #[error("full fine-tuning does not take an adapter config")]
    AdapterForbidden,

    #[error("invalid adapter config: {0}")]
    InvalidAdapter(String),

    #[error("trainable parameters ({trainable}) exceed total parameters ({total})")]
    TrainableExceedsTotal { trainable: u64, total: u64 },

    #[error("invalid eval shape: {0}")]
    InvalidEvalShape(String),

    #[error(transparent)]
    Math(#[from] MathProblem),
}

/// Method, shape and optional evaluation shape of one training run.
///
/// Supplying either eval value enables the eval KV-cache spike; the missing
/// one defaults to its training counterpart.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSetup {
    pub method: TrainingMethod,
    pub batch_size: u64,
    pub seq_len: u64,
    pub adapter: Option<AdapterConfig>,
    pub eval_batch_size: Option<u64>,
    pub eval_seq_len: Option<u64>,
}

impl TrainingSetup {
    pub fn shape(&self) -> BatchShape {
        BatchShape::new(self.batch_size, self.seq_len)
    }

    pub fn eval_shape(&self) -> Option<BatchShape> {
        if self.eval_batch_size.is_none() && self.eval_seq_len.is_none() {
            return None;
        }
        Some(BatchShape::new(
            self.eval_batch_size.unwrap_or(self.batch_size),
            self.eval_seq_len.unwrap_or(self.seq_len),
        ))
    }

    /// Same setup at another micro batch size.
    #[must_use]
    pub fn with_batch_size(&self, batch_size: u64) -> Self {
        Self {
            batch_size,
            ..self.clone()
        }
    }
}

/// The orchestrator. Holds a shared, read-only family registry and the
/// engine's assumptions; each [`VramEstimator::estimate`] call is independent.
#[derive(Debug, Clone)]
pub struct VramEstimator {
    families: Arc<FamilyRegistry>,
    config: EstimatorConfig,
}

impl Default for VramEstimator {
    fn default() -> Self {
        Self::new(Arc::new(FamilyRegistry::builtin()), EstimatorConfig::default())
    }
}

impl VramEstimator {
    pub fn new(families: Arc<FamilyRegistry>, config: EstimatorConfig) -> Self {
        Self { families, config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn families(&self) -> &Arc<FamilyRegistry> {
        &self.families
    }

    /// Validates the request, then computes every component.
    ///
    /// All input errors are reported before any calculator runs; a returned
    /// breakdown is always complete.
    pub fn estimate(
        &self,
        profile: &ModelProfile,
        hardware: &HardwareSpec,
        setup: &TrainingSetup,
    ) -> Result<VramBreakdown, EstimateError> {
        let adapter_params = self.validate(profile, setup)?;
        let method = setup.method;
        let shape = setup.shape();

        let resolved = self.families.resolve(profile.architecture());
        let family = resolved.family.as_ref();
        let family_degraded = !resolved.exact || family.is_fallback();

        let dtype = calculators::training_dtype(profile, method, &self.config);
        let trainable = calculators::trainable_params(profile, method, adapter_params);
        crate::debug!(
            "estimating {} {method}: family {}, batch {}, seq {}, {trainable} trainable params in {dtype}",
            profile.model_id(),
            family.name(),
            shape.batch_size,
            shape.seq_len
        );

        let weight_fields: &[ProfileField] = match method {
            TrainingMethod::Full | TrainingMethod::Lora => {
                &[ProfileField::TotalParams, ProfileField::WeightDtype]
            }
            TrainingMethod::Qlora => &[ProfileField::TotalParams],
        };
        let trainable_fields: &[ProfileField] = match method {
            TrainingMethod::Full => &[ProfileField::TotalParams, ProfileField::WeightDtype],
            TrainingMethod::Lora => &[
                ProfileField::NumKvHeads,
                ProfileField::IntermediateSize,
                ProfileField::WeightDtype,
            ],
            TrainingMethod::Qlora => &[ProfileField::NumKvHeads, ProfileField::IntermediateSize],
        };

        let mut components = Vec::with_capacity(5);
        components.push(degrade_if_defaulted(
            profile,
            weight_fields,
            calculators::weights(profile, method, adapter_params, &self.config)?,
        )?);
        components.push(degrade_if_defaulted(
            profile,
            trainable_fields,
            calculators::optimizer_state(trainable, dtype, &self.config)?,
        )?);
        components.push(degrade_if_defaulted(
            profile,
            trainable_fields,
            calculators::gradients(trainable, dtype, &self.config)?,
        )?);

        let activations = if self.config.gradient_checkpointing {
            family.checkpointed_activation_memory(profile, shape, dtype)?
        } else {
            family.activation_memory(profile, shape, dtype)?
        };
        components.push(family_component(
            ComponentKind::Activations,
            activations,
            family,
            family_degraded,
            profile,
        )?);
        components.push(calculators::logits_buffer(
            shape.batch_size,
            shape.seq_len,
            profile.vocab_size(),
        )?);

        let eval_spike = match setup.eval_shape() {
            Some(eval_shape) => {
                let kv_dtype = self.config.kv_cache_dtype.unwrap_or(dtype);
                let kv = family.kv_cache_memory(profile, eval_shape, kv_dtype)?;
                Some(family_component(
                    ComponentKind::EvalKvCache,
                    kv,
                    family,
                    family_degraded,
                    profile,
                )?)
            }
            None => None,
        };

        let breakdown = VramBreakdown::assemble()
            .model_id(profile.model_id())
            .method(method)
            .batch_size(shape.batch_size)
            .seq_len(shape.seq_len)
            .components(components)
            .maybe_eval_spike(eval_spike)
            .usable_bytes(hardware.usable_bytes())
            .family(family.name())
            .exact_family_match(resolved.exact)
            .trainable_params(trainable)
            .call()?;

        crate::info!(
            "{} {method} batch {} seq {}: peak {:.2} GB of {:.2} GB usable ({}, {} confidence)",
            profile.model_id(),
            shape.batch_size,
            shape.seq_len,
            fitcheck_devices::bytes_to_gib(breakdown.peak_bytes()),
            fitcheck_devices::bytes_to_gib(hardware.usable_bytes()),
            if breakdown.fits() { "fits" } else { "does not fit" },
            breakdown.confidence()
        );
        Ok(breakdown)
    }

    /// Returns the adapter parameter count (0 for full fine-tuning).
    fn validate(
        &self,
        profile: &ModelProfile,
        setup: &TrainingSetup,
    ) -> Result<u64, EstimateError> {
        if setup.batch_size == 0 {
            return Err(EstimateError::ZeroBatchSize);
        }
        if setup.seq_len == 0 {
            return Err(EstimateError::ZeroSeqLen);
        }
        if setup.seq_len > profile.max_seq_len() {
            return Err(EstimateError::SeqLenExceedsMax {
                seq_len: setup.seq_len,
                max_seq_len: profile.max_seq_len(),
            });
        }

        let adapter_params = match (setup.method, &setup.adapter) {
            (TrainingMethod::Full, Some(_)) => return Err(EstimateError::AdapterForbidden),
            (TrainingMethod::Full, None) => 0,
            (method, None) => return Err(EstimateError::AdapterRequired { method }),
            (_, Some(adapter)) => validate_adapter(profile, adapter)?,
        };

        if let Some(eval) = setup.eval_shape() {
            if eval.batch_size == 0 {
                return Err(EstimateError::InvalidEvalShape(
                    "eval_batch_size must be at least 1".to_string(),
                ));
            }
            if eval.seq_len == 0 || eval.seq_len > profile.max_seq_len() {
                return Err(EstimateError::InvalidEvalShape(format!(
                    "eval_seq_len {} must be between 1 and {}",
                    eval.seq_len,
                    profile.max_seq_len()
                )));
            }
        }

        let trainable = calculators::trainable_params(profile, setup.method, adapter_params);
        if trainable > profile.total_params() {
            return Err(EstimateError::TrainableExceedsTotal {
                trainable,
                total: profile.total_params(),
            });
        }
        Ok(adapter_params)
    }
}

fn validate_adapter(profile: &ModelProfile, adapter: &AdapterConfig) -> Result<u64, EstimateError> {
    if adapter.rank == 0 {
        return Err(EstimateError::InvalidAdapter("rank must be at least 1".to_string()));
    }
    let params = adapter.param_count(profile).map_err(|_| {
        EstimateError::InvalidAdapter(format!(
            "rank {} overflows the adapter parameter count",
            adapter.rank
        ))
    })?;
    if params == 0 {
        return Err(EstimateError::InvalidAdapter(format!(
            "targets [{}] match no projection in {}",
            adapter.target_names().join(", "),
            profile.architecture()
        )));
    }
    Ok(params)
}

fn degrade_if_defaulted(
    profile: &ModelProfile,
    fields: &[ProfileField],
    component: ComponentEstimate,
) -> Result<ComponentEstimate, MathProblem> {
    let defaulted: Vec<String> = fields
        .iter()
        .filter(|f| profile.is_defaulted(**f))
        .map(ToString::to_string)
        .collect();
    if defaulted.is_empty() {
        return Ok(component);
    }
    crate::debug!(
        "{} rests on defaulted {}",
        component.kind(),
        defaulted.join(", ")
    );
    component.degraded(&format!("assumed {}", defaulted.join(", ")))
}

fn family_component(
    kind: ComponentKind,
    estimate: FamilyEstimate,
    family: &dyn ArchitectureFamily,
    family_degraded: bool,
    profile: &ModelProfile,
) -> Result<ComponentEstimate, MathProblem> {
    let confidence = if family_degraded {
        Confidence::Low
    } else {
        Confidence::High
    };
    let component = ComponentEstimate::new(
        kind,
        estimate.bytes,
        estimate.low_bytes,
        estimate.high_bytes,
        confidence,
        estimate.rationale,
    );
    degrade_if_defaulted(profile, family.required_fields(), component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dtype::DType, estimate::family::tests::llama_8b};

    fn rtx_3090() -> HardwareSpec {
        HardwareSpec::from_gib("NVIDIA RTX 3090", 24.0, 1.2).unwrap()
    }

    fn qlora(batch_size: u64, seq_len: u64) -> TrainingSetup {
        TrainingSetup::builder()
            .method(TrainingMethod::Qlora)
            .batch_size(batch_size)
            .seq_len(seq_len)
            .adapter(AdapterConfig::with_rank(16))
            .build()
    }

    #[test]
    fn rejects_bad_shapes_before_computing() {
        let estimator = VramEstimator::default();
        let profile = llama_8b();
        let hw = rtx_3090();
        assert_eq!(
            estimator.estimate(&profile, &hw, &qlora(0, 512)).unwrap_err(),
            EstimateError::ZeroBatchSize
        );
        assert_eq!(
            estimator.estimate(&profile, &hw, &qlora(1, 0)).unwrap_err(),
            EstimateError::ZeroSeqLen
        );
        assert_eq!(
            estimator.estimate(&profile, &hw, &qlora(1, 200_000)).unwrap_err(),
            EstimateError::SeqLenExceedsMax {
                seq_len: 200_000,
                max_seq_len: 131072
            }
        );
    }

    #[test]
    fn adapter_presence_must_match_method() {
        let estimator = VramEstimator::default();
        let profile = llama_8b();
        let hw = rtx_3090();

        let mut setup = qlora(1, 512);
        setup.adapter = None;
        assert_eq!(
            estimator.estimate(&profile, &hw, &setup).unwrap_err(),
            EstimateError::AdapterRequired {
                method: TrainingMethod::Qlora
            }
        );

        let mut setup = qlora(1, 512);
        setup.method = TrainingMethod::Full;
        assert_eq!(
            estimator.estimate(&profile, &hw, &setup).unwrap_err(),
            EstimateError::AdapterForbidden
        );

        let mut setup = qlora(1, 512);
        setup.adapter = Some(AdapterConfig::with_rank(0));
        assert!(matches!(
            estimator.estimate(&profile, &hw, &setup).unwrap_err(),
            EstimateError::InvalidAdapter(_)
        ));
    }

    #[test]
    fn adapter_larger_than_model_is_rejected() {
        let profile = ModelProfile::builder()
            .model_id("tiny")
            .architecture("LlamaForCausalLM")
            .total_params(1_000)
            .num_layers(2)
            .hidden_size(64)
            .num_attention_heads(4)
            .num_kv_heads(4)
            .intermediate_size(128)
            .vocab_size(100)
            .max_seq_len(128)
            .weight_dtype(DType::Float32)
            .build()
            .unwrap();
        let setup = TrainingSetup::builder()
            .method(TrainingMethod::Lora)
            .batch_size(1)
            .seq_len(16)
            .adapter(AdapterConfig::with_rank(64))
            .build();
        let err = VramEstimator::default()
            .estimate(&profile, &rtx_3090(), &setup)
            .unwrap_err();
        assert!(matches!(err, EstimateError::TrainableExceedsTotal { .. }));
    }

    #[test]
    fn overflowing_rank_is_an_input_error() {
        let setup = TrainingSetup::builder()
            .method(TrainingMethod::Lora)
            .batch_size(1)
            .seq_len(512)
            .adapter(AdapterConfig::with_rank(u64::MAX / 1000))
            .build();
        let err = VramEstimator::default()
            .estimate(&llama_8b(), &rtx_3090(), &setup)
            .unwrap_err();
        assert!(matches!(err, EstimateError::InvalidAdapter(msg) if msg.contains("overflows")));
    }

    #[test]
    fn eval_shape_defaults_and_validation() {
        let estimator = VramEstimator::default();
        let profile = llama_8b();
        let hw = rtx_3090();

        let mut setup = qlora(4, 1024);
        setup.eval_seq_len = Some(2048);
        let breakdown = estimator.estimate(&profile, &hw, &setup).unwrap();
        let spike = breakdown.eval_spike().unwrap();
        // eval batch falls back to the training batch
        assert_eq!(spike.bytes(), 2 * 32 * 8 * 128 * 2 * 4 * 2048);
        assert_eq!(
            breakdown.peak_bytes(),
            breakdown.steady_state_bytes() + spike.bytes()
        );

        setup.eval_seq_len = Some(1_000_000);
        assert!(matches!(
            estimator.estimate(&profile, &hw, &setup).unwrap_err(),
            EstimateError::InvalidEvalShape(_)
        ));
    }

    #[test]
    fn checkpointing_shrinks_activations() {
        let profile = llama_8b();
        let hw = rtx_3090();
        let plain = VramEstimator::default()
            .estimate(&profile, &hw, &qlora(4, 1024))
            .unwrap();
        let ckpt = VramEstimator::new(
            Arc::new(FamilyRegistry::builtin()),
            EstimatorConfig::builder().gradient_checkpointing(true).build(),
        )
        .estimate(&profile, &hw, &qlora(4, 1024))
        .unwrap();
        let act = |b: &VramBreakdown| b.component(ComponentKind::Activations).unwrap().bytes();
        assert!(act(&ckpt) < act(&plain));
        assert!(ckpt.steady_state_bytes() < plain.steady_state_bytes());
    }

    #[test]
    fn defaulted_kv_heads_lowers_family_confidence_only() {
        let profile = ModelProfile::builder()
            .model_id("m")
            .architecture("LlamaForCausalLM")
            .total_params(1_000_000_000)
            .num_layers(16)
            .hidden_size(2048)
            .num_attention_heads(16)
            .intermediate_size(8192)
            .vocab_size(32_000)
            .max_seq_len(4096)
            .weight_dtype(DType::BFloat16)
            .build()
            .unwrap();
        let setup = TrainingSetup::builder()
            .method(TrainingMethod::Full)
            .batch_size(1)
            .seq_len(512)
            .build();
        let breakdown = VramEstimator::default()
            .estimate(&profile, &rtx_3090(), &setup)
            .unwrap();
        let conf = |k| breakdown.component(k).unwrap().confidence();
        assert_eq!(conf(ComponentKind::Activations), Confidence::Low);
        assert_eq!(conf(ComponentKind::Weights), Confidence::High);
        assert_eq!(conf(ComponentKind::LogitsBuffer), Confidence::High);
        assert_eq!(breakdown.confidence(), Confidence::Low);
        assert!(breakdown.exact_family_match());
    }
}
