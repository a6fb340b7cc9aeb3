use fitcheck_devices::{
    bytes_to_gib, gib, HardwareEntry, HardwareError, HardwareRegistry, HardwareSpec,
    LoggingConfig, LoggingConfigTrait,
};

#[test]
fn consumer_and_datacenter_aliases() {
    let registry = HardwareRegistry::builtin();
    for (alias, expected_total) in [("3090", 24.0), ("4090", 24.0), ("a100-40gb", 40.0), ("H100", 80.0), ("t4", 16.0)] {
        let spec = registry.lookup(alias).unwrap();
        assert!((bytes_to_gib(spec.total_bytes()) - expected_total).abs() < 1e-9, "{alias}");
        assert!(spec.usable_bytes() < spec.total_bytes());
    }
}

#[test]
fn unknown_gpu_names_the_input() {
    match HardwareRegistry::builtin().lookup("potato") {
        Err(HardwareError::NotFound { name, available }) => {
            assert_eq!(name, "potato");
            assert_eq!(available.len(), HardwareEntry::ALL.len());
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn custom_spec_outside_the_table() {
    let spec = HardwareSpec::new("Workstation", gib(48.0), gib(2.0)).unwrap();
    assert_eq!(spec.usable_bytes(), gib(46.0));
    assert!(spec.to_string().contains("Workstation"));
}

#[test]
fn logging_config_is_chainable() {
    let config = LoggingConfig::new().logger_name("it").log_level_warn();
    assert_eq!(config.level, tracing::Level::WARN);
    assert!(config.log_dir.is_none());
}
