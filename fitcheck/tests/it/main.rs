use std::path::{Path, PathBuf};

use fitcheck::{parse_plan_spec, DatasetFormat, ModelSource, PlanRequest, Planner};
use fitcheck_devices::LoggingConfigTrait;
use fitcheck_models::{TrainingMethod, Verdict};

const MODEL_ID: &str = "meta-llama/Llama-3.1-8B";

fn llama_config() -> serde_json::Value {
    serde_json::json!({
        "architectures": ["LlamaForCausalLM"],
        "hidden_act": "silu",
        "hidden_size": 4096,
        "intermediate_size": 14336,
        "max_position_embeddings": 131072,
        "num_attention_heads": 32,
        "num_hidden_layers": 32,
        "num_key_value_heads": 8,
        "tie_word_embeddings": false,
        "torch_dtype": "bfloat16",
        "vocab_size": 128256
    })
}

fn request(method: &str, gpu: &str) -> PlanRequest {
    PlanRequest::builder()
        .model_id(MODEL_ID)
        .model(ModelSource::Config(llama_config()))
        .method(method)
        .gpu(gpu)
        .total_params(8_030_000_000)
        .build()
}

#[test]
fn qlora_8b_on_3090_produces_a_complete_report() {
    let report = Planner::default().plan(&request("qlora", "3090")).unwrap();
    assert_eq!(report.model_id, MODEL_ID);
    assert_eq!(report.method, TrainingMethod::Qlora);
    assert_eq!(report.hardware.name(), "NVIDIA RTX 3090");
    assert_eq!(report.seq_len_used, 512);
    assert!(report.seq_len_reasoning.contains("default"));
    assert!(report.seq_len_reasoning.contains("512"));
    assert_eq!(report.solver_result.recommended.verdict, Verdict::Fits);
    assert!(report.trainable_pct > 0.0 && report.trainable_pct < 1.0);
    assert_eq!(report.total_params, 8_030_000_000);
}

#[test]
fn explicit_seq_len_is_used() {
    let mut req = request("qlora", "3090");
    req.seq_len = Some(1024);
    let report = Planner::default().plan(&req).unwrap();
    assert_eq!(report.seq_len_used, 1024);
    assert_eq!(report.solver_result.recommended.seq_len, 1024);
}

#[test]
fn full_fine_tune_does_not_fit_on_3090() {
    let report = Planner::default().plan(&request("full", "3090")).unwrap();
    assert_eq!(report.solver_result.recommended.verdict, Verdict::DoesNotFit);
    assert!((report.trainable_pct - 100.0).abs() < 1e-9);
}

#[test]
fn unknown_method_and_gpu_are_named_in_the_error() {
    let err = Planner::default().plan(&request("banana", "3090")).unwrap_err();
    assert!(err.to_string().contains("banana"));
    let err = Planner::default().plan(&request("qlora", "potato")).unwrap_err();
    assert!(err.to_string().contains("potato"));
}

#[test]
fn zero_seq_len_is_rejected() {
    let mut req = request("lora", "a100");
    req.seq_len = Some(0);
    assert!(Planner::default().plan(&req).is_err());
}

#[test]
fn fixed_batch_size_skips_the_search() {
    let mut req = request("lora", "a100");
    req.batch_size = Some(2);
    let report = Planner::default().plan(&req).unwrap();
    assert_eq!(report.solver_result.recommended.micro_batch_size, 2);
    assert!(report.solver_result.aggressive.is_none());
}

#[test]
fn eval_seq_len_adds_a_spike() {
    let mut req = request("qlora", "4090");
    req.batch_size = Some(1);
    req.eval_seq_len = Some(4096);
    let report = Planner::default().plan(&req).unwrap();
    let breakdown = &report.solver_result.recommended.breakdown;
    assert!(breakdown.eval_spike().is_some());
    assert!(breakdown.peak_bytes() > breakdown.steady_state_bytes());
}

#[test]
fn config_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, llama_config().to_string()).unwrap();
    let req = PlanRequest::builder()
        .model_id(MODEL_ID)
        .model(ModelSource::Path(path))
        .method("qlora")
        .gpu("rtx 3090")
        .build();
    let report = Planner::default().plan(&req).unwrap();
    assert_eq!(report.architecture, "LlamaForCausalLM");
    // No explicit count: derived from dimensions.
    assert!((report.total_params_b - 8.03).abs() < 0.01);

    let missing = PlanRequest::builder()
        .model_id("nope")
        .model(ModelSource::Path(dir.path().join("missing.json")))
        .method("qlora")
        .gpu("3090")
        .build();
    let err = Planner::default().plan(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("missing.json"));
}

#[test]
fn report_renders_every_section() {
    let out = Planner::default()
        .plan(&request("qlora", "3090"))
        .unwrap()
        .to_string();
    for section in ["Model", "Hardware", "VRAM Breakdown", "Recommended Config"] {
        assert!(out.contains(section), "missing {section}:\n{out}");
    }
    assert!(out.contains("NVIDIA RTX 3090"));
    assert!(out.contains("Logits buffer"));
}

#[test]
fn report_serializes_to_json() {
    let report = Planner::default().plan(&request("lora", "h100")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value["method"], "lora");
    assert!(value["solver_result"]["recommended"]["breakdown"]["fits"].is_boolean());
}

#[test]
fn one_line_spec_drives_a_plan() {
    let spec = parse_plan_spec("QLoRA meta-llama/Llama-3.1-8B on 3090 at 2048").unwrap();
    let req = PlanRequest::builder()
        .model_id(spec.model_id.clone())
        .model(ModelSource::Config(llama_config()))
        .method(spec.method.to_string())
        .gpu(spec.gpu.clone())
        .maybe_seq_len(spec.seq_len)
        .build();
    let report = Planner::default().plan(&req).unwrap();
    assert_eq!(report.method, TrainingMethod::Qlora);
    assert_eq!(report.seq_len_used, 2048);
}

fn write_alpaca_jsonl(dir: &Path, rows: usize) -> PathBuf {
    let path = dir.join("train.jsonl");
    let body: String = (0..rows)
        .map(|i| {
            serde_json::json!({
                "instruction": format!("Question {i} ").repeat(20),
                "input": "",
                "output": format!("Answer {i} ").repeat(30),
            })
            .to_string()
                + "\n"
        })
        .collect();
    std::fs::write(&path, body).unwrap();
    path
}

fn overfit_warnings(report: &fitcheck::PlanReport) -> Vec<&String> {
    report
        .solver_result
        .warnings
        .iter()
        .filter(|w| w.to_lowercase().contains("overfit"))
        .collect()
}

#[test]
fn dataset_p95_drives_seq_len() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request("qlora", "3090");
    req.dataset_path = Some(write_alpaca_jsonl(dir.path(), 500));
    let report = Planner::default().plan(&req).unwrap();

    assert!(report.seq_len_reasoning.contains("dataset p95"));
    let dataset = report.dataset.as_ref().unwrap();
    assert_eq!(dataset.num_rows, 500);
    assert_eq!(dataset.detected_format, DatasetFormat::Alpaca);
    assert_eq!(report.seq_len_used, dataset.seq_len_stats.as_ref().unwrap().p95);
    assert!(report.to_string().contains("Dataset"));
}

#[test]
fn explicit_seq_len_beats_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request("qlora", "3090");
    req.dataset_path = Some(write_alpaca_jsonl(dir.path(), 500));
    req.seq_len = Some(1024);
    let report = Planner::default().plan(&req).unwrap();
    assert_eq!(report.seq_len_used, 1024);
    assert!(report.seq_len_reasoning.contains("explicit"));
}

#[test]
fn tiny_dataset_is_flagged_for_overfitting() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request("qlora", "3090");
    req.dataset_path = Some(write_alpaca_jsonl(dir.path(), 50));
    let report = Planner::default().plan(&req).unwrap();
    assert!(!overfit_warnings(&report).is_empty(), "{:?}", report.solver_result.warnings);

    req.dataset_path = Some(write_alpaca_jsonl(dir.path(), 5000));
    let report = Planner::default().plan(&req).unwrap();
    assert!(overfit_warnings(&report).is_empty(), "{:?}", report.solver_result.warnings);
}

#[test]
fn missing_dataset_is_named_in_the_error() {
    let mut req = request("qlora", "3090");
    req.dataset_path = Some(PathBuf::from("/nonexistent/path/to/train.jsonl"));
    let err = Planner::default().plan(&req).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/path/to/train.jsonl"));
    assert!(err.downcast_ref::<fitcheck::DatasetError>().is_some());
}

#[test]
fn spec_with_dataset_clause_plans_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_alpaca_jsonl(dir.path(), 500);
    let spec = parse_plan_spec(&format!("lora {MODEL_ID} on a100 with {}", data.display())).unwrap();
    assert_eq!(spec.dataset_path.as_deref(), Some(data.as_path()));

    let report = Planner::default()
        .plan(&spec.into_request(ModelSource::Config(llama_config())))
        .unwrap();
    assert_eq!(report.method, TrainingMethod::Lora);
    assert!(report.seq_len_reasoning.contains("dataset p95"));
}

#[test]
fn planner_carries_logging_settings() {
    let planner = Planner::default()
        .logger_name("fitcheck_it")
        .log_level_debug()
        .logging_enabled(false)
        .init()
        .unwrap();
    assert_eq!(planner.logging_config.logger_name, "fitcheck_it");
    assert!(!planner.logging_config.is_loaded());
    assert!(planner.plan(&request("qlora", "3090")).is_ok());
}
