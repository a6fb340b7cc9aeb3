use fitcheck_devices::{bytes_to_gib, i_nlns};
use serde::{Deserialize, Serialize};

use super::{
    component::{ComponentEstimate, ComponentKind, Confidence},
    math::{sum, MathProblem},
    method::TrainingMethod,
};

/// Every component of one estimate plus the totals and the fit decision.
///
/// ```text
/// steady_state = Σ training components
/// peak         = steady_state + eval spike (0 without eval shape)
/// fits         = peak <= usable
/// headroom     = usable - peak            (negative on overflow)
/// ```
/// Built once by the estimator and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VramBreakdown {
    model_id: String,
    method: TrainingMethod,
    batch_size: u64,
    seq_len: u64,
    components: Vec<ComponentEstimate>,
    eval_spike: Option<ComponentEstimate>,
    steady_state_bytes: u64,
    steady_state_low_bytes: u64,
    steady_state_high_bytes: u64,
    peak_bytes: u64,
    peak_low_bytes: u64,
    peak_high_bytes: u64,
    usable_bytes: u64,
    fits: bool,
    headroom_bytes: i64,
    family: String,
    exact_family_match: bool,
    confidence: Confidence,
    trainable_params: u64,
}

#[bon::bon]
impl VramBreakdown {
    #[builder]
    pub fn assemble(
        #[builder(into)] model_id: String,
        method: TrainingMethod,
        batch_size: u64,
        seq_len: u64,
        components: Vec<ComponentEstimate>,
        eval_spike: Option<ComponentEstimate>,
        usable_bytes: u64,
        #[builder(into)] family: String,
        exact_family_match: bool,
        trainable_params: u64,
    ) -> Result<Self, MathProblem> {
        let steady_state_bytes = sum(components.iter().map(ComponentEstimate::bytes))?;
        let steady_state_low_bytes = sum(components.iter().map(ComponentEstimate::low_bytes))?;
        let steady_state_high_bytes = sum(components.iter().map(ComponentEstimate::high_bytes))?;

        let (spike, spike_low, spike_high) = eval_spike
            .as_ref()
            .map_or((0, 0, 0), |s| (s.bytes(), s.low_bytes(), s.high_bytes()));
        let peak_bytes = sum([steady_state_bytes, spike])?;
        let peak_low_bytes = sum([steady_state_low_bytes, spike_low])?;
        let peak_high_bytes = sum([steady_state_high_bytes, spike_high])?;

        let headroom = usable_bytes as i128 - peak_bytes as i128;
        let headroom_bytes = headroom.clamp(i64::MIN as i128, i64::MAX as i128) as i64;

        let confidence = components
            .iter()
            .chain(eval_spike.iter())
            .map(ComponentEstimate::confidence)
            .min()
            .unwrap_or(Confidence::High);

        Ok(Self {
            model_id,
            method,
            batch_size,
            seq_len,
            components,
            eval_spike,
            steady_state_bytes,
            steady_state_low_bytes,
            steady_state_high_bytes,
            peak_bytes,
            peak_low_bytes,
            peak_high_bytes,
            usable_bytes,
            fits: peak_bytes <= usable_bytes,
            headroom_bytes,
            family,
            exact_family_match,
            confidence,
            trainable_params,
        })
    }
}

impl VramBreakdown {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn method(&self) -> TrainingMethod {
        self.method
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn seq_len(&self) -> u64 {
        self.seq_len
    }

    /// Training-time components in a fixed order: weights, optimizer state,
    /// gradients, activations, logits buffer.
    pub fn components(&self) -> &[ComponentEstimate] {
        &self.components
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentEstimate> {
        self.components
            .iter()
            .chain(self.eval_spike.iter())
            .find(|c| c.kind() == kind)
    }

    /// The evaluation KV-cache, when an eval shape was supplied.
    pub fn eval_spike(&self) -> Option<&ComponentEstimate> {
        self.eval_spike.as_ref()
    }

    /// Largest steady-state component.
    pub fn dominant_component(&self) -> Option<&ComponentEstimate> {
        self.components.iter().max_by_key(|c| c.bytes())
    }

    pub fn steady_state_bytes(&self) -> u64 {
        self.steady_state_bytes
    }

    pub fn steady_state_interval(&self) -> (u64, u64) {
        (self.steady_state_low_bytes, self.steady_state_high_bytes)
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    pub fn peak_interval(&self) -> (u64, u64) {
        (self.peak_low_bytes, self.peak_high_bytes)
    }

    pub fn usable_bytes(&self) -> u64 {
        self.usable_bytes
    }

    pub fn fits(&self) -> bool {
        self.fits
    }

    /// `usable - peak`. Negative by the amount of the overflow.
    pub fn headroom_bytes(&self) -> i64 {
        self.headroom_bytes
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn exact_family_match(&self) -> bool {
        self.exact_family_match
    }

    /// Lowest confidence over all components.
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn trainable_params(&self) -> u64 {
        self.trainable_params
    }

    pub fn low_confidence_components(&self) -> Vec<&ComponentEstimate> {
        self.components
            .iter()
            .chain(self.eval_spike.iter())
            .filter(|c| c.confidence() == Confidence::Low)
            .collect()
    }
}

impl std::fmt::Display for VramBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "VramBreakdown:")?;
        for c in self.components.iter().chain(self.eval_spike.iter()) {
            i_nlns(
                f,
                &[format_args!(
                    "{:<20} {:>7.2} GB  [{:.2} – {:.2}]  {}: {}",
                    c.name(),
                    bytes_to_gib(c.bytes()),
                    bytes_to_gib(c.low_bytes()),
                    bytes_to_gib(c.high_bytes()),
                    c.confidence(),
                    c.rationale()
                )],
            )?;
        }
        let headroom_gib = self.headroom_bytes as f64 / fitcheck_devices::BYTES_PER_GIB as f64;
        i_nlns(
            f,
            &[
                format_args!(
                    "Steady state: {:.2} GB [{:.2} – {:.2}]",
                    bytes_to_gib(self.steady_state_bytes),
                    bytes_to_gib(self.steady_state_low_bytes),
                    bytes_to_gib(self.steady_state_high_bytes)
                ),
                format_args!(
                    "Peak: {:.2} GB [{:.2} – {:.2}]",
                    bytes_to_gib(self.peak_bytes),
                    bytes_to_gib(self.peak_low_bytes),
                    bytes_to_gib(self.peak_high_bytes)
                ),
                format_args!(
                    "Usable: {:.2} GB, headroom {:+.2} GB ({})",
                    bytes_to_gib(self.usable_bytes),
                    headroom_gib,
                    if self.fits { "fits" } else { "does not fit" }
                ),
                format_args!(
                    "Family: {}{} ({} confidence)",
                    self.family,
                    if self.exact_family_match { "" } else { " (no exact match)" },
                    self.confidence
                ),
            ],
        )
    }
}
