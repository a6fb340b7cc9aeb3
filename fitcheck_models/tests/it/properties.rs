use std::sync::Arc;

use fitcheck_devices::HardwareSpec;
use fitcheck_models::{
    ArchitectureFamily, BatchShape, ComponentKind, Confidence, DType, EstimateError,
    EstimatorConfig, FamilyRegistry, GatedDecoderFamily, TrainingMethod, VramEstimator,
};

use crate::{llama_8b, llama_8b_with_kv_heads, rtx_3090, setup};

const METHODS: [TrainingMethod; 3] = [
    TrainingMethod::Full,
    TrainingMethod::Lora,
    TrainingMethod::Qlora,
];

fn bytes_of(kind: ComponentKind, method: TrainingMethod, batch: u64, seq: u64) -> u64 {
    VramEstimator::default()
        .estimate(&llama_8b(), &rtx_3090(), &setup(method, batch, seq))
        .unwrap()
        .component(kind)
        .unwrap()
        .bytes()
}

#[test]
fn logits_buffer_is_exact_for_every_method() {
    for method in METHODS {
        for (batch, seq) in [(1, 1), (4, 1024), (3, 777)] {
            assert_eq!(
                bytes_of(ComponentKind::LogitsBuffer, method, batch, seq),
                batch * seq * 128_000 * 4,
                "{method} {batch}x{seq}"
            );
        }
    }
}

#[test]
fn logits_buffer_ignores_training_dtype() {
    let estimator = VramEstimator::new(
        Arc::new(FamilyRegistry::builtin()),
        EstimatorConfig::builder()
            .qlora_compute_dtype(DType::Float32)
            .build(),
    );
    let breakdown = estimator
        .estimate(&llama_8b(), &rtx_3090(), &setup(TrainingMethod::Qlora, 2, 64))
        .unwrap();
    assert_eq!(
        breakdown.component(ComponentKind::LogitsBuffer).unwrap().bytes(),
        2 * 64 * 128_000 * 4
    );
}

#[test]
fn adapters_shrink_optimizer_state_and_gradients() {
    for kind in [ComponentKind::OptimizerState, ComponentKind::Gradients] {
        let full = bytes_of(kind, TrainingMethod::Full, 4, 1024);
        for method in [TrainingMethod::Lora, TrainingMethod::Qlora] {
            assert!(bytes_of(kind, method, 4, 1024) < full, "{kind} {method}");
        }
    }
}

#[test]
fn kv_cache_is_monotonic_in_kv_heads() {
    let family = GatedDecoderFamily;
    let shape = BatchShape::new(4, 2048);
    let mut previous = 0;
    for kv_heads in [1, 2, 4, 8, 16, 32] {
        let profile = llama_8b_with_kv_heads(kv_heads, "LlamaForCausalLM");
        let bytes = family
            .kv_cache_memory(&profile, shape, DType::BFloat16)
            .unwrap()
            .bytes;
        assert!(bytes >= previous, "kv_heads {kv_heads}");
        previous = bytes;
    }
}

#[test]
fn fit_and_headroom_agree_with_peak() {
    let profile = llama_8b();
    let probe = VramEstimator::default()
        .estimate(&profile, &rtx_3090(), &setup(TrainingMethod::Qlora, 2, 512))
        .unwrap();
    let peak = probe.peak_bytes();

    for usable in [peak - 1, peak, peak + 1, peak * 2] {
        let hw = HardwareSpec::new("probe", usable + 1024, 1024).unwrap();
        let b = VramEstimator::default()
            .estimate(&profile, &hw, &setup(TrainingMethod::Qlora, 2, 512))
            .unwrap();
        assert_eq!(b.usable_bytes(), usable);
        assert_eq!(b.fits(), b.peak_bytes() <= usable);
        assert_eq!(b.headroom_bytes(), usable as i64 - b.peak_bytes() as i64);
    }
}

#[test]
fn unknown_architecture_falls_back_with_lower_confidence() {
    let known = llama_8b();
    let unknown = llama_8b_with_kv_heads(8, "BrandNewForCausalLM");
    let s = setup(TrainingMethod::Qlora, 4, 1024);

    let exact = VramEstimator::default()
        .estimate(&known, &rtx_3090(), &s)
        .unwrap();
    let fallback = VramEstimator::default()
        .estimate(&unknown, &rtx_3090(), &s)
        .unwrap();

    assert!(!fallback.exact_family_match());
    assert_eq!(fallback.family(), "fallback");
    assert!(fallback.confidence() < exact.confidence());
    let act = fallback.component(ComponentKind::Activations).unwrap();
    assert_eq!(act.confidence(), Confidence::Low);
    assert!(act.bytes() >= exact.component(ComponentKind::Activations).unwrap().bytes());
}

#[test]
fn injected_registry_controls_dispatch() {
    let registry = Arc::new(
        FamilyRegistry::empty().register("BrandNewForCausalLM", Arc::new(GatedDecoderFamily)),
    );
    let estimator = VramEstimator::new(registry, EstimatorConfig::default());
    let s = setup(TrainingMethod::Qlora, 1, 128);

    let new_arch = estimator
        .estimate(&llama_8b_with_kv_heads(8, "BrandNewForCausalLM"), &rtx_3090(), &s)
        .unwrap();
    assert!(new_arch.exact_family_match());
    let llama = estimator.estimate(&llama_8b(), &rtx_3090(), &s).unwrap();
    assert!(!llama.exact_family_match());
}

#[test]
fn seq_len_over_max_is_rejected_without_breakdown() {
    let err = VramEstimator::default()
        .estimate(&llama_8b(), &rtx_3090(), &setup(TrainingMethod::Qlora, 1, 8193))
        .unwrap_err();
    assert_eq!(
        err,
        EstimateError::SeqLenExceedsMax {
            seq_len: 8193,
            max_seq_len: 8192
        }
    );
}

#[test]
fn every_interval_contains_its_point() {
    for method in METHODS {
        let mut s = setup(method, 2, 1024);
        s.eval_batch_size = Some(8);
        let b = VramEstimator::default()
            .estimate(&llama_8b(), &rtx_3090(), &s)
            .unwrap();
        for c in b.components().iter().chain(b.eval_spike()) {
            assert!(c.low_bytes() <= c.bytes() && c.bytes() <= c.high_bytes(), "{}", c.name());
        }
        let (low, high) = b.peak_interval();
        assert!(low <= b.peak_bytes() && b.peak_bytes() <= high);
        assert!(b.peak_bytes() > b.steady_state_bytes());
    }
}
