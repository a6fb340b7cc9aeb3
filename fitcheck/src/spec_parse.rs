use std::{path::PathBuf, sync::OnceLock};

use fitcheck_models::TrainingMethod;
use regex::Regex;

use crate::plan::{ModelSource, PlanRequest};

/// Fields of a one-line plan spec such as
/// `qlora meta-llama/Llama-3.1-8B on 3090 with train.jsonl at 2048`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpec {
    pub method: TrainingMethod,
    pub model_id: String,
    pub gpu: String,
    pub dataset_path: Option<PathBuf>,
    pub seq_len: Option<u64>,
}

impl ParsedSpec {
    /// A request for this spec; the architecture still has to come from `model`.
    pub fn into_request(self, model: ModelSource) -> PlanRequest {
        PlanRequest::builder()
            .model_id(self.model_id)
            .model(model)
            .method(self.method.to_string())
            .gpu(self.gpu)
            .maybe_seq_len(self.seq_len)
            .maybe_dataset_path(self.dataset_path)
            .build()
    }
}

/// `METHOD MODEL on GPU [with DATASET] [at SEQ_LEN]`, method case-insensitive.
///
/// Returns `None` when the line does not have that shape, so callers can
/// fall back to explicit fields.
pub fn parse_plan_spec(spec: &str) -> Option<ParsedSpec> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| {
            Regex::new(
                r"(?ix)
                ^(full|lora|qlora)      # method
                \s+(\S+)                # model id
                \s+on\s+(\S+)           # gpu
                (?:\s+with\s+(\S+))?    # optional dataset
                (?:\s+at\s+(\d+))?      # optional seq_len
                $",
            )
            .ok()
        })
        .as_ref()?;

    let caps = re.captures(spec.trim())?;
    let seq_len = match caps.get(5) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(ParsedSpec {
        method: caps[1].parse().ok()?,
        model_id: caps[2].to_string(),
        gpu: caps[3].to_string(),
        dataset_path: caps.get(4).map(|m| PathBuf::from(m.as_str())),
        seq_len,
    })
}
