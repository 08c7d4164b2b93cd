use darwin_engine::config::{ApiStyle, Config};
use darwin_engine::scorer::{bootstrap_confidence_interval, mean, BootstrapConfig};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_bootstrap_bounds_are_ordered(
        accuracies in proptest::collection::vec(prop_oneof![Just(0.0f64), Just(1.0f64)], 1..60),
        seed in any::<u64>(),
    ) {
        let config = BootstrapConfig {
            samples: 500,
            confidence_level: 0.95,
            seed: Some(seed),
        };
        let summary = bootstrap_confidence_interval(&accuracies, &config).unwrap();

        prop_assert!(0.0 <= summary.lower);
        prop_assert!(summary.lower <= summary.median);
        prop_assert!(summary.median <= summary.upper);
        prop_assert!(summary.upper <= 1.0);

        // All-equal input has a degenerate interval at that value
        let m = mean(&accuracies);
        if accuracies.iter().all(|a| *a == accuracies[0]) {
            prop_assert_eq!(summary.lower, m);
            prop_assert_eq!(summary.upper, m);
        }
    }

    #[test]
    fn test_bootstrap_is_reproducible_with_seed(
        accuracies in proptest::collection::vec(prop_oneof![Just(0.0f64), Just(1.0f64)], 1..40),
        seed in any::<u64>(),
    ) {
        let config = BootstrapConfig {
            samples: 300,
            confidence_level: 0.9,
            seed: Some(seed),
        };
        let a = bootstrap_confidence_interval(&accuracies, &config).unwrap();
        let b = bootstrap_confidence_interval(&accuracies, &config).unwrap();
        prop_assert_eq!(a, b);
        prop_assert!(a.to_string().starts_with("90% Bootstrap Confidence Interval"));
    }
}

proptest! {
    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        azure in any::<bool>(),
        meta_temperature in 0.0..=2.0f64,
        n_generation in 0..=200u32,
        debug_max in 1..=10u32,
        accuracy_floor in 0.0..=1.0f64,
        max_workers in 1..=128usize,
        valid_size in 1..=1000usize,
        shuffle_seed in 0..=(i64::MAX as u64),
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level;
        if azure {
            config.oracle.api_style = ApiStyle::Azure;
            config.oracle.api_version = Some("2024-02-15-preview".to_string());
        }
        config.models.meta_temperature = meta_temperature;
        config.search.n_generation = n_generation;
        config.search.debug_max = debug_max;
        config.search.accuracy_floor = accuracy_floor;
        config.evaluation.max_workers = max_workers;
        config.dataset.valid_size = valid_size;
        config.dataset.shuffle_seed = shuffle_seed;

        let serialized = toml::to_string(&config).expect("Failed to serialize config");
        let mut parsed: Config = toml::from_str(&serialized).expect("Failed to parse config");

        prop_assert_eq!(&parsed, &config);
        prop_assert!(parsed.validate_and_process().is_ok());
    }
}
