use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use bon::Builder;
use fitcheck_devices::{
    bytes_to_gib, i_nlns, HardwareRegistry, HardwareSpec, LoggingConfig, LoggingConfigTrait,
};
use fitcheck_models::{
    format_params, AdapterConfig, BatchSizeSolver, ModelProfile, ProfileResolver,
    SolverResult, TrainingMethod, TrainingPlan, TrainingSetup,
};
use serde::Serialize;

use crate::dataset::{analyze_local, check_training_sanity, DatasetProfile};

/// Sequence length used when the request does not give one.
pub const DEFAULT_SEQ_LEN: u64 = 512;

pub const DEFAULT_LORA_RANK: u64 = 16;

/// Where the model's architecture comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A parsed hub `config.json`.
    Config(serde_json::Value),
    /// Path to a `config.json` on disk.
    Path(PathBuf),
    /// A profile built by the caller.
    Profile(ModelProfile),
}

#[derive(Builder, Debug, Clone)]
pub struct PlanRequest {
    #[builder(into)]
    pub model_id: String,

    pub model: ModelSource,

    /// `full`, `lora` or `qlora`.
    #[builder(into)]
    pub method: String,

    /// GPU name or alias, e.g. `3090`, `a100-80gb`.
    #[builder(into)]
    pub gpu: String,

    /// *Default = the dataset's p95 when one is given, else
    /// [`DEFAULT_SEQ_LEN`]; either is capped at the model's maximum.*
    pub seq_len: Option<u64>,

    /// Local `.jsonl` / `.json` training data to size the run against.
    pub dataset_path: Option<PathBuf>,

    #[builder(default = DEFAULT_LORA_RANK)]
    pub lora_rank: u64,

    /// Evaluate exactly this micro batch size instead of searching.
    pub batch_size: Option<u64>,

    /// Maximum eval sequence length, for the KV-cache spike.
    pub eval_seq_len: Option<u64>,

    pub eval_batch_size: Option<u64>,

    /// Known parameter count; otherwise derived from the config dimensions.
    pub total_params: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub model_id: String,
    pub architecture: String,
    pub total_params: u64,
    pub total_params_b: f64,
    pub vocab_size: u64,
    pub num_layers: u64,
    pub seq_len_used: u64,
    pub seq_len_reasoning: String,
    pub hardware: HardwareSpec,
    pub method: TrainingMethod,
    pub trainable_params: u64,
    pub trainable_pct: f64,
    pub dataset: Option<DatasetProfile>,
    pub solver_result: SolverResult,
}

/// Ties hardware lookup, profile resolution and the batch-size solver
/// together.
#[derive(Debug, Clone)]
pub struct Planner {
    hardware: Arc<HardwareRegistry>,
    solver: BatchSizeSolver,
    pub logging_config: LoggingConfig,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(Arc::new(HardwareRegistry::builtin()), BatchSizeSolver::default())
    }
}

impl LoggingConfigTrait for Planner {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        &mut self.logging_config
    }
}

impl Planner {
    pub fn new(hardware: Arc<HardwareRegistry>, solver: BatchSizeSolver) -> Self {
        Self {
            hardware,
            solver,
            logging_config: LoggingConfig::default(),
        }
    }

    /// Installs the logger described by [`Planner::logging_config`].
    pub fn init(mut self) -> crate::Result<Self> {
        self.logging_config.load_logger()?;
        Ok(self)
    }

    pub fn plan(&self, request: &PlanRequest) -> crate::Result<PlanReport> {
        let method: TrainingMethod = request.method.parse()?;
        let hardware = self.hardware.lookup(&request.gpu)?;
        let profile = self.resolve_profile(request)?;
        let dataset = request.dataset_path.as_ref().map(analyze_local).transpose()?;
        let (seq_len, seq_len_reasoning) =
            resolve_seq_len(request.seq_len, dataset.as_ref(), &profile)?;
        crate::debug!("seq_len {seq_len}: {seq_len_reasoning}");

        let setup = TrainingSetup::builder()
            .method(method)
            .batch_size(request.batch_size.unwrap_or(1))
            .seq_len(seq_len)
            .maybe_adapter(
                method
                    .requires_adapter()
                    .then(|| AdapterConfig::with_rank(request.lora_rank)),
            )
            .maybe_eval_batch_size(request.eval_batch_size)
            .maybe_eval_seq_len(request.eval_seq_len)
            .build();

        let mut solver_result = match request.batch_size {
            Some(_) => self.solver.estimate_fixed(&profile, &hardware, &setup)?,
            None => self.solver.solve(&profile, &hardware, &setup)?,
        };

        let trainable_params = solver_result.recommended.breakdown.trainable_params();
        let trainable_pct = trainable_params as f64 / profile.total_params() as f64 * 100.0;
        if let Some(dataset) = &dataset {
            for warning in check_training_sanity(dataset, seq_len, trainable_params) {
                crate::warn!("{warning}");
                solver_result.warnings.push(warning.to_string());
            }
        }
        crate::info!(
            "planned {} {method} on {}: {}",
            profile.model_id(),
            hardware.name(),
            solver_result.recommended.verdict
        );

        Ok(PlanReport {
            model_id: profile.model_id().to_string(),
            architecture: profile.architecture().to_string(),
            total_params: profile.total_params(),
            total_params_b: profile.total_params_b(),
            vocab_size: profile.vocab_size(),
            num_layers: profile.num_layers(),
            seq_len_used: seq_len,
            seq_len_reasoning,
            hardware,
            method,
            trainable_params,
            trainable_pct,
            dataset,
            solver_result,
        })
    }

    fn resolve_profile(&self, request: &PlanRequest) -> crate::Result<ModelProfile> {
        let mut resolver = ProfileResolver::new();
        if let Some(total) = request.total_params {
            resolver = resolver.with_total_params(total);
        }
        let profile = match &request.model {
            ModelSource::Config(raw) => resolver.resolve_value(&request.model_id, raw.clone()),
            ModelSource::Path(path) => resolver.resolve_path(&request.model_id, path),
            ModelSource::Profile(profile) => return Ok(profile.clone()),
        };
        profile.with_context(|| format!("could not build a profile for {}", request.model_id))
    }
}

/// Explicit value, then the dataset's p95, then [`DEFAULT_SEQ_LEN`]. Only
/// the explicit value may exceed the model's maximum (and is rejected later).
fn resolve_seq_len(
    explicit: Option<u64>,
    dataset: Option<&DatasetProfile>,
    profile: &ModelProfile,
) -> crate::Result<(u64, String)> {
    let max = profile.max_seq_len();
    let (derived, reasoning) = match (explicit, dataset.and_then(|d| d.seq_len_stats.as_ref())) {
        (Some(0), _) => crate::bail!("seq_len must be positive, got 0"),
        (Some(n), _) => return Ok((n, format!("explicit ({n})"))),
        (None, Some(stats)) => (
            stats.p95.max(1),
            format!("dataset p95 ({} tokens)", stats.p95),
        ),
        (None, None) => (DEFAULT_SEQ_LEN, format!("default ({DEFAULT_SEQ_LEN})")),
    };
    if derived > max {
        return Ok((max, format!("{reasoning}, capped at model maximum ({max})")));
    }
    Ok((derived, reasoning))
}

impl PlanReport {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for PlanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rec = &self.solver_result.recommended;

        writeln!(f, "Model")?;
        i_nlns(
            f,
            &[
                format_args!("{} ({})", self.model_id, self.architecture),
                format_args!(
                    "{} params, {} layers, vocab {}",
                    format_params(self.total_params),
                    self.num_layers,
                    self.vocab_size
                ),
                format_args!(
                    "Trainable: {} ({:.2}%) via {}",
                    format_params(self.trainable_params),
                    self.trainable_pct,
                    self.method
                ),
                format_args!("Sequence length: {} [{}]", self.seq_len_used, self.seq_len_reasoning),
            ],
        )?;

        if let Some(dataset) = &self.dataset {
            writeln!(f, "Dataset")?;
            i_nlns(f, &[format_args!("{dataset}")])?;
        }

        writeln!(f, "Hardware")?;
        i_nlns(
            f,
            &[
                format_args!("{}", self.hardware.name()),
                format_args!(
                    "{:.1} GB total, {:.1} GB overhead, {:.1} GB usable",
                    bytes_to_gib(self.hardware.total_bytes()),
                    bytes_to_gib(self.hardware.reserved_bytes()),
                    bytes_to_gib(self.hardware.usable_bytes())
                ),
            ],
        )?;

        writeln!(f, "VRAM Breakdown (batch {})", rec.micro_batch_size)?;
        i_nlns(f, &[format_args!("{}", rec.breakdown)])?;

        writeln!(f, "Recommended Config")?;
        write_plan(f, rec)?;
        if let Some(agg) = &self.solver_result.aggressive {
            writeln!(f, "Aggressive Config")?;
            write_plan(f, agg)?;
        }

        if !self.solver_result.warnings.is_empty() {
            writeln!(f, "Warnings")?;
            for w in &self.solver_result.warnings {
                i_nlns(f, &[format_args!("! {w}")])?;
            }
        }
        Ok(())
    }
}

fn write_plan(f: &mut std::fmt::Formatter<'_>, plan: &TrainingPlan) -> std::fmt::Result {
    i_nlns(
        f,
        &[
            format_args!(
                "micro batch {} × {} accumulation steps = effective batch {}",
                plan.micro_batch_size, plan.gradient_accumulation_steps, plan.effective_batch_size
            ),
            format_args!(
                "seq_len {}, optimizer {}, gradient checkpointing {}",
                plan.seq_len,
                plan.optimizer,
                if plan.gradient_checkpointing { "on" } else { "off" }
            ),
        ],
    )?;
    if let Some(rank) = plan.lora_rank {
        i_nlns(
            f,
            &[format_args!("LoRA rank {rank} on {}", plan.lora_targets.join(", "))],
        )?;
    }
    i_nlns(
        f,
        &[format_args!(
            "Peak {:.2} GB, headroom {:+.2} GB: {}",
            bytes_to_gib(plan.breakdown.peak_bytes()),
            plan.breakdown.headroom_bytes() as f64 / fitcheck_devices::BYTES_PER_GIB as f64,
            plan.verdict
        )],
    )?;
    if let Some(detail) = &plan.detail {
        i_nlns(f, &[format_args!("{detail}")])?;
    }
    Ok(())
}
