//! Picks a micro batch size for a fixed model, method and sequence length.
//!
//! Every candidate is estimated independently. The **recommended** plan is
//! the largest candidate whose peak stays under `usable · (1 - safety)`;
//! the **aggressive** plan is the largest candidate that fits at all, when
//! that is larger. Gradient accumulation fills the gap to the target
//! effective batch size.

use bon::Builder;
use fitcheck_devices::{bytes_to_gib, HardwareSpec};
use serde::{Deserialize, Serialize};

use super::{
    breakdown::VramBreakdown,
    component::ComponentKind,
    estimator::{EstimateError, TrainingSetup, VramEstimator},
    math::div_ceil,
};
use crate::profile::ModelProfile;

/// Logits buffer share of steady state above which a warning is emitted.
const LOGITS_WARNING_SHARE: f64 = 0.25;

#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Micro batch sizes to try, ascending.
    #[builder(default = vec![1, 2, 4, 8, 16, 32, 64])]
    pub candidate_batch_sizes: Vec<u64>,

    #[builder(default = 16)]
    pub target_effective_batch_size: u64,

    /// Fraction of usable memory the recommended plan leaves free.
    #[builder(default = 0.10)]
    pub safety_headroom: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig::builder().build()
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Fits with the safety headroom to spare.
    #[display("fits")]
    Fits,
    /// Fits, but inside the safety headroom.
    #[display("tight")]
    Tight,
    #[display("does_not_fit")]
    DoesNotFit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub micro_batch_size: u64,
    pub gradient_accumulation_steps: u64,
    pub effective_batch_size: u64,
    pub seq_len: u64,
    pub gradient_checkpointing: bool,
    pub optimizer: String,
    pub lora_rank: Option<u64>,
    pub lora_targets: Vec<String>,
    pub verdict: Verdict,
    /// Why the verdict was reached, set when the plan does not fit.
    pub detail: Option<String>,
    pub breakdown: VramBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    pub recommended: TrainingPlan,
    pub aggressive: Option<TrainingPlan>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSizeSolver {
    estimator: VramEstimator,
    config: SolverConfig,
}

impl BatchSizeSolver {
    pub fn new(estimator: VramEstimator, config: SolverConfig) -> Self {
        Self { estimator, config }
    }

    pub fn estimator(&self) -> &VramEstimator {
        &self.estimator
    }

    /// Searches `candidate_batch_sizes`; `setup.batch_size` is ignored.
    pub fn solve(
        &self,
        profile: &ModelProfile,
        hardware: &HardwareSpec,
        setup: &TrainingSetup,
    ) -> Result<SolverResult, EstimateError> {
        let mut candidates = self.config.candidate_batch_sizes.clone();
        candidates.retain(|&b| b > 0);
        candidates.sort_unstable();
        candidates.dedup();
        if candidates.is_empty() {
            candidates.push(1);
        }

        let safe_limit = self.safe_limit(hardware);
        let mut recommended: Option<VramBreakdown> = None;
        let mut aggressive: Option<VramBreakdown> = None;
        let mut smallest: Option<VramBreakdown> = None;

        for batch_size in candidates {
            let breakdown =
                self.estimator
                    .estimate(profile, hardware, &setup.with_batch_size(batch_size))?;
            crate::trace!(
                "batch {batch_size}: peak {:.2} GB",
                bytes_to_gib(breakdown.peak_bytes())
            );
            if smallest.is_none() {
                smallest = Some(breakdown.clone());
            }
            if !breakdown.fits() {
                // Peak grows monotonically with batch size.
                break;
            }
            if breakdown.peak_bytes() <= safe_limit {
                recommended = Some(breakdown.clone());
            }
            aggressive = Some(breakdown);
        }

        let (recommended, aggressive) = match (recommended, aggressive) {
            (Some(rec), agg) => {
                let agg = agg.filter(|a| a.batch_size() > rec.batch_size());
                (rec, agg)
            }
            (None, Some(agg)) => (agg, None),
            (None, None) => match smallest {
                Some(smallest) => (smallest, None),
                None => {
                    let breakdown =
                        self.estimator
                            .estimate(profile, hardware, &setup.with_batch_size(1))?;
                    (breakdown, None)
                }
            },
        };

        Ok(self.result(setup, recommended, aggressive, hardware))
    }

    /// Evaluates exactly `setup.batch_size`.
    pub fn estimate_fixed(
        &self,
        profile: &ModelProfile,
        hardware: &HardwareSpec,
        setup: &TrainingSetup,
    ) -> Result<SolverResult, EstimateError> {
        let breakdown = self.estimator.estimate(profile, hardware, setup)?;
        Ok(self.result(setup, breakdown, None, hardware))
    }

    fn safe_limit(&self, hardware: &HardwareSpec) -> u64 {
        let keep = (1.0 - self.config.safety_headroom).clamp(0.0, 1.0);
        (hardware.usable_bytes() as f64 * keep).floor() as u64
    }

    fn result(
        &self,
        setup: &TrainingSetup,
        recommended: VramBreakdown,
        aggressive: Option<VramBreakdown>,
        hardware: &HardwareSpec,
    ) -> SolverResult {
        let warnings = self.warnings(&recommended, hardware);
        SolverResult {
            recommended: self.plan(setup, recommended, hardware),
            aggressive: aggressive.map(|b| self.plan(setup, b, hardware)),
            warnings,
        }
    }

    fn plan(
        &self,
        setup: &TrainingSetup,
        breakdown: VramBreakdown,
        hardware: &HardwareSpec,
    ) -> TrainingPlan {
        let micro = breakdown.batch_size();
        let target = self.config.target_effective_batch_size.max(micro);
        let steps = div_ceil(target, micro).max(1);

        let (verdict, detail) = if !breakdown.fits() {
            (
                Verdict::DoesNotFit,
                Some(format!(
                    "Requires {:.1} GB but only {:.1} GB usable",
                    bytes_to_gib(breakdown.peak_bytes()),
                    bytes_to_gib(breakdown.usable_bytes())
                )),
            )
        } else if breakdown.peak_bytes() > self.safe_limit(hardware) {
            (Verdict::Tight, None)
        } else {
            (Verdict::Fits, None)
        };

        let config = self.estimator.config();
        TrainingPlan {
            micro_batch_size: micro,
            gradient_accumulation_steps: steps,
            effective_batch_size: micro * steps,
            seq_len: breakdown.seq_len(),
            gradient_checkpointing: config.gradient_checkpointing,
            optimizer: config.optimizer.to_string(),
            lora_rank: setup.adapter.as_ref().map(|a| a.rank),
            lora_targets: setup
                .adapter
                .as_ref()
                .map(|a| a.target_names())
                .unwrap_or_default(),
            verdict,
            detail,
            breakdown,
        }
    }

    fn warnings(&self, breakdown: &VramBreakdown, hardware: &HardwareSpec) -> Vec<String> {
        let mut warnings = Vec::new();
        if !breakdown.fits() {
            warnings.push(format!(
                "This configuration does not fit on {}: even batch size {} needs {:.1} GB of {:.1} GB usable.",
                hardware.name(),
                breakdown.batch_size(),
                bytes_to_gib(breakdown.peak_bytes()),
                bytes_to_gib(hardware.usable_bytes())
            ));
            if let Some(dominant) = breakdown.dominant_component() {
                warnings.push(format!(
                    "{} is the largest component at {:.1} GB.",
                    dominant.name(),
                    bytes_to_gib(dominant.bytes())
                ));
            }
        }
        if let Some(logits) = breakdown.component(ComponentKind::LogitsBuffer) {
            let share = logits.bytes() as f64 / breakdown.steady_state_bytes().max(1) as f64;
            if share > LOGITS_WARNING_SHARE {
                warnings.push(format!(
                    "Logits buffer is large: {:.1} GB ({:.0}% of steady state). A shorter seq_len or smaller batch shrinks it linearly.",
                    bytes_to_gib(logits.bytes()),
                    share * 100.0
                ));
            }
        }
        if !breakdown.exact_family_match() {
            warnings.push(format!(
                "Architecture of {} is not recognized; activation and KV-cache numbers use conservative multi-head assumptions.",
                breakdown.model_id()
            ));
        }
        let low: Vec<String> = breakdown
            .low_confidence_components()
            .iter()
            .map(|c| c.name())
            .collect();
        if !low.is_empty() {
            warnings.push(format!("Low confidence: {}.", low.join(", ")));
        }
        for w in &warnings {
            crate::warn!("{w}");
        }
        warnings
    }
}
