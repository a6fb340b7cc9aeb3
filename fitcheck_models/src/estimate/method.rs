use std::{collections::BTreeSet, str::FromStr};

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::math::{product, sum, MathProblem};
use crate::profile::ModelProfile;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown training method '{0}' (expected full, lora or qlora)")]
pub struct MethodParseError(pub String);

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown adapter target module '{0}'")]
pub struct TargetParseError(pub String);

/// How the model is fine-tuned.
///
/// * `Full`: every parameter is trainable, base weights stay at their storage dtype.
/// * `Lora`: base weights frozen at their storage dtype, low-rank adapters trained.
/// * `Qlora`: base weights frozen and quantized to 4 bits, adapters trained.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMethod {
    #[display("full")]
    Full,
    #[display("lora")]
    Lora,
    #[display("qlora")]
    Qlora,
}

impl TrainingMethod {
    pub const fn requires_adapter(self) -> bool {
        matches!(self, TrainingMethod::Lora | TrainingMethod::Qlora)
    }
}

impl FromStr for TrainingMethod {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full-ft" | "full_ft" => Ok(TrainingMethod::Full),
            "lora" => Ok(TrainingMethod::Lora),
            "qlora" => Ok(TrainingMethod::Qlora),
            _ => Err(MethodParseError(s.to_string())),
        }
    }
}

/// Linear projections inside a decoder block that an adapter can attach to.
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
#[serde(rename_all = "snake_case")]
pub enum TargetModule {
    #[display("q_proj")]
    QProj,
    #[display("k_proj")]
    KProj,
    #[display("v_proj")]
    VProj,
    #[display("o_proj")]
    OProj,
    #[display("gate_proj")]
    GateProj,
    #[display("up_proj")]
    UpProj,
    #[display("down_proj")]
    DownProj,
}

impl TargetModule {
    pub const ALL: [TargetModule; 7usize] = [
        TargetModule::QProj,
        TargetModule::KProj,
        TargetModule::VProj,
        TargetModule::OProj,
        TargetModule::GateProj,
        TargetModule::UpProj,
        TargetModule::DownProj,
    ];

    pub fn all_linear() -> BTreeSet<TargetModule> {
        Self::ALL.into_iter().collect()
    }

    /// `(in_features, out_features)` of this projection, or `None` when the
    /// model has no such matrix (`gate_proj` on a plain MLP).
    pub fn shape(self, profile: &ModelProfile) -> Option<(u64, u64)> {
        let h = profile.hidden_size();
        let i = profile.intermediate_size();
        match self {
            TargetModule::QProj => Some((h, profile.q_dim())),
            TargetModule::KProj | TargetModule::VProj => Some((h, profile.kv_dim())),
            TargetModule::OProj => Some((profile.q_dim(), h)),
            TargetModule::GateProj if !profile.gated_mlp() => None,
            TargetModule::GateProj | TargetModule::UpProj => Some((h, i)),
            TargetModule::DownProj => Some((i, h)),
        }
    }

    /// Parses a comma separated list. `all-linear` selects every projection.
    pub fn parse_list(list: &str) -> Result<BTreeSet<TargetModule>, TargetParseError> {
        let mut targets = BTreeSet::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all-linear") || name.eq_ignore_ascii_case("all_linear") {
                targets.extend(Self::ALL);
            } else {
                targets.insert(name.parse()?);
            }
        }
        Ok(targets)
    }
}

impl FromStr for TargetModule {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let target = match s.trim().to_ascii_lowercase().as_str() {
            "q_proj" | "q" => TargetModule::QProj,
            "k_proj" | "k" => TargetModule::KProj,
            "v_proj" | "v" => TargetModule::VProj,
            "o_proj" | "o" => TargetModule::OProj,
            "gate_proj" | "gate" => TargetModule::GateProj,
            "up_proj" | "up" => TargetModule::UpProj,
            "down_proj" | "down" => TargetModule::DownProj,
            _ => return Err(TargetParseError(s.to_string())),
        };
        Ok(target)
    }
}

/// Low-rank adapter settings for LoRA and QLoRA.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Rank `r` of each `A·B` decomposition.
    pub rank: u64,

    /// Scaling numerator (`alpha / r`). Kept for reporting; it has no effect
    /// on memory.
    #[builder(default = 32.0)]
    pub alpha: f64,

    /// Projections that get an adapter. *Default = every linear projection*.
    #[builder(default = TargetModule::all_linear())]
    pub targets: BTreeSet<TargetModule>,
}

impl AdapterConfig {
    pub fn with_rank(rank: u64) -> Self {
        AdapterConfig::builder().rank(rank).build()
    }

    /// Adapter parameters added to `profile`.
    ///
    /// ```text
    /// per target  = r · (in + out)
    /// total       = L · Σ_targets per target
    /// ```
    pub fn param_count(&self, profile: &ModelProfile) -> Result<u64, MathProblem> {
        let per_target = self
            .targets
            .iter()
            .filter_map(|t| t.shape(profile))
            .map(|(d_in, d_out)| product(&[self.rank, sum([d_in, d_out])?]))
            .collect::<Result<Vec<u64>, MathProblem>>()?;
        product(&[profile.num_layers(), sum(per_target)?])
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(ToString::to_string).collect()
    }
}
