//! # fitcheck
//!
//! Answers "will this fine-tuning run fit on this GPU?" without running a
//! single training step.
//!
//! ```no_run
//! use fitcheck::{ModelSource, PlanRequest, Planner};
//!
//! let request = PlanRequest::builder()
//!     .model_id("meta-llama/Llama-3.1-8B")
//!     .model(ModelSource::Path("config.json".into()))
//!     .method("qlora")
//!     .gpu("3090")
//!     .seq_len(1024)
//!     .build();
//! let report = Planner::default().plan(&request)?;
//! println!("{report}");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! A local `.jsonl` / `.json` dataset can be attached with
//! `PlanRequest::dataset_path`: its p95 row length becomes the default
//! sequence length and small datasets are flagged for overfitting.
//!
//! The estimation engine lives in [`fitcheck_models`]; accelerator specs and
//! logging in [`fitcheck_devices`]. Both are re-exported.

pub mod dataset;
pub mod plan;
pub mod spec_parse;

#[allow(unused_imports)]
pub(crate) use anyhow::{anyhow, bail, Result};
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, span, trace, warn, Level};

pub use fitcheck_devices;
pub use fitcheck_models;

pub use self::{
    dataset::{
        analyze_local, check_training_sanity, DatasetError, DatasetFormat, DatasetProfile,
        SanityWarning, SeqLenStats, Severity,
    },
    plan::{ModelSource, PlanReport, PlanRequest, Planner, DEFAULT_LORA_RANK, DEFAULT_SEQ_LEN},
    spec_parse::{parse_plan_spec, ParsedSpec},
};
