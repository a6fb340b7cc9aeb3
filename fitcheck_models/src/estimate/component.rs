use serde::{Deserialize, Serialize};

use super::math::{scale, MathProblem};

/// Widening applied to a component whose inputs include a defaulted profile field.
pub const DEFAULTED_LOW_FACTOR: f64 = 0.75;
pub const DEFAULTED_HIGH_FACTOR: f64 = 1.25;

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
pub enum ComponentKind {
    #[display("Model weights")]
    Weights,
    #[display("Optimizer states")]
    OptimizerState,
    #[display("Gradients")]
    Gradients,
    #[display("Activations")]
    Activations,
    #[display("Logits buffer")]
    LogitsBuffer,
    /// Transient; counted in peak, never in steady state.
    #[display("Eval KV-cache spike")]
    EvalKvCache,
}

/// How far a number can be trusted. `Low < High`, so the weakest component
/// of a breakdown is its `min`.
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
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[display("low")]
    Low,
    #[display("high")]
    High,
}

/// One memory component of a breakdown. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEstimate {
    kind: ComponentKind,
    bytes: u64,
    low_bytes: u64,
    high_bytes: u64,
    confidence: Confidence,
    rationale: String,
}

impl ComponentEstimate {
    /// The interval is clamped so that `low <= bytes <= high` always holds.
    pub fn new(
        kind: ComponentKind,
        bytes: u64,
        low_bytes: u64,
        high_bytes: u64,
        confidence: Confidence,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            bytes,
            low_bytes: low_bytes.min(bytes),
            high_bytes: high_bytes.max(bytes),
            confidence,
            rationale: rationale.into(),
        }
    }

    /// A closed-form count with a zero-width interval.
    pub fn exact(kind: ComponentKind, bytes: u64, rationale: impl Into<String>) -> Self {
        Self::new(kind, bytes, bytes, bytes, Confidence::High, rationale)
    }

    /// Marks the component as resting on an assumed profile value and widens
    /// its interval accordingly.
    pub fn degraded(self, reason: &str) -> Result<Self, MathProblem> {
        Ok(Self {
            low_bytes: scale(self.low_bytes, DEFAULTED_LOW_FACTOR)?.min(self.bytes),
            high_bytes: scale(self.high_bytes, DEFAULTED_HIGH_FACTOR)?.max(self.bytes),
            confidence: Confidence::Low,
            rationale: format!("{}; {reason}", self.rationale),
            ..self
        })
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn name(&self) -> String {
        self.kind.to_string()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn low_bytes(&self) -> u64 {
        self.low_bytes
    }

    pub fn high_bytes(&self) -> u64 {
        self.high_bytes
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }
}
