//! ## Fine-tuning memory estimation
//!
//! ```text
//! profile + hardware + setup
//!     │
//!     ├── calculators ── weights, optimizer state, gradients, logits buffer
//!     ├── family ─────── activations (+ eval KV-cache spike)
//!     ▼
//! VramBreakdown ── steady state, peak, fit, headroom, confidence
//! ```
//!
//! The calculators know nothing about architectures. Everything that depends
//! on tensor shapes inside a block lives behind [`family::ArchitectureFamily`]
//! and is selected by the profile's architecture string.

pub mod breakdown;
pub mod calculators;
pub mod component;
pub mod config;
pub mod estimator;
pub mod family;
pub mod math;
pub mod method;
pub mod solver;
