use fitcheck_devices::bytes_to_gib;
use fitcheck_models::{
    resolve_profile, BatchSizeSolver, ComponentKind, Confidence, TrainingMethod, Verdict,
    VramEstimator,
};

use crate::{llama_8b, rtx_3090, setup};

#[test]
fn qlora_8b_on_3090_fits_in_the_mid_teens() {
    let breakdown = VramEstimator::default()
        .estimate(&llama_8b(), &rtx_3090(), &setup(TrainingMethod::Qlora, 4, 1024))
        .unwrap();
    println!("{breakdown}");

    let steady_gib = bytes_to_gib(breakdown.steady_state_bytes());
    assert!((12.0..18.0).contains(&steady_gib), "{steady_gib}");
    assert!(breakdown.fits());
    assert!(breakdown.headroom_bytes() > 0);
    assert_eq!(breakdown.confidence(), Confidence::High);
    assert_eq!(breakdown.family(), "gated-decoder");
    assert!(breakdown.eval_spike().is_none());
    assert_eq!(breakdown.peak_bytes(), breakdown.steady_state_bytes());
    // rank 16 on all seven projections
    assert_eq!(breakdown.trainable_params(), 41_943_040);
}

#[test]
fn full_fine_tune_8b_on_3090_overflows_on_optimizer_state() {
    let breakdown = VramEstimator::default()
        .estimate(&llama_8b(), &rtx_3090(), &setup(TrainingMethod::Full, 4, 1024))
        .unwrap();

    assert!(breakdown.steady_state_bytes() > rtx_3090().usable_bytes());
    assert!(!breakdown.fits());
    assert!(breakdown.headroom_bytes() < 0);
    assert_eq!(
        breakdown.dominant_component().unwrap().kind(),
        ComponentKind::OptimizerState
    );
}

#[test]
fn solver_reports_does_not_fit_for_full_fine_tune() {
    let result = BatchSizeSolver::default()
        .solve(&llama_8b(), &rtx_3090(), &setup(TrainingMethod::Full, 1, 512))
        .unwrap();
    assert_eq!(result.recommended.verdict, Verdict::DoesNotFit);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Optimizer states")));
}

#[test]
fn profile_from_config_document_estimates_end_to_end() {
    let raw = serde_json::json!({
        "architectures": ["MistralForCausalLM"],
        "hidden_act": "silu",
        "hidden_size": 4096,
        "intermediate_size": 14336,
        "max_position_embeddings": 32768,
        "num_attention_heads": 32,
        "num_hidden_layers": 32,
        "num_key_value_heads": 8,
        "torch_dtype": "bfloat16",
        "vocab_size": 32768
    });
    let profile = resolve_profile("mistralai/Mistral-7B-v0.3", raw).unwrap();
    let breakdown = VramEstimator::default()
        .estimate(&profile, &rtx_3090(), &setup(TrainingMethod::Lora, 2, 1024))
        .unwrap();

    assert!(breakdown.exact_family_match());
    // Derived parameter count: weights rest on an assumed value.
    let weights = breakdown.component(ComponentKind::Weights).unwrap();
    assert_eq!(weights.confidence(), Confidence::Low);
    assert!(weights.low_bytes() < weights.bytes() && weights.bytes() < weights.high_bytes());
    assert_eq!(
        breakdown.component(ComponentKind::Activations).unwrap().confidence(),
        Confidence::High
    );
    assert_eq!(breakdown.confidence(), Confidence::Low);
}
