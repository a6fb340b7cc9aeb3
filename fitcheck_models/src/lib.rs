//! # fitcheck_models: Model profiles and the fine-tuning VRAM estimator
//!
//! Describes a model's architecture (`ModelProfile`), reads one from a hub
//! style `config.json`, and predicts how much accelerator memory a training
//! run will need before any step is executed.
//!
//! ## Features
//!
//! * `ModelProfile` with validated dimensions and a record of every field that had to be assumed
//! * Config document → profile resolution (`ProfileResolver`, `resolve_profile`)
//! * Generic calculators for weights, optimizer state, gradients and the logits buffer
//! * Architecture families for activation and KV-cache memory, dispatched through a `FamilyRegistry`
//! * `VramEstimator` producing a `VramBreakdown` with per-component confidence
//! * `BatchSizeSolver` picking the largest micro batch that fits

pub mod dtype;
pub mod estimate;
pub mod profile;

#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

pub use self::{
    dtype::{DType, DTypeParseError},
    estimate::{
        breakdown::VramBreakdown,
        calculators::format_params,
        component::{ComponentEstimate, ComponentKind, Confidence},
        config::{EstimatorConfig, MasterWeightPolicy, OptimizerKind, QuantSpec},
        estimator::{EstimateError, TrainingSetup, VramEstimator},
        family::{
            registry::{FamilyRegistry, ResolvedFamily},
            ArchitectureFamily, BatchShape, DenseDecoderFamily, FallbackFamily, FamilyEstimate,
            GatedDecoderFamily, QuadraticAttentionFamily,
        },
        math::MathProblem,
        method::{AdapterConfig, MethodParseError, TargetModule, TargetParseError, TrainingMethod},
        solver::{BatchSizeSolver, SolverConfig, SolverResult, TrainingPlan, Verdict},
    },
    profile::{
        resolve::{resolve_profile, ProfileResolver, RawModelConfig},
        ModelProfile, ProfileError, ProfileField,
    },
};
