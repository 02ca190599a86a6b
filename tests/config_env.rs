use ferrous_registry::{DiError, RegistryConfig, ServiceRegistry, DEFAULT_ENV_PREFIX};
use serial_test::serial;
use std::env;
use std::time::Duration;

const VARS: [&str; 5] = [
    "HISTORY_CAPACITY",
    "SLOW_THRESHOLD_MS",
    "MAX_ATTEMPTS",
    "INITIAL_DELAY_MS",
    "BACKOFF_FACTOR",
];

fn clear(prefix: &str) {
    for var in VARS {
        env::remove_var(format!("{}_{}", prefix, var));
    }
}

#[test]
#[serial]
fn test_env_defaults_when_unset() {
    clear(DEFAULT_ENV_PREFIX);
    let config = RegistryConfig::from_env().unwrap();
    assert_eq!(config, RegistryConfig::default());
    assert!(config.default_resilience.is_none());
}

#[test]
#[serial]
fn test_env_overrides_with_custom_prefix() {
    clear("BILLING");
    env::set_var("BILLING_HISTORY_CAPACITY", "32");
    env::set_var("BILLING_SLOW_THRESHOLD_MS", " 40 ");
    env::set_var("BILLING_MAX_ATTEMPTS", "3");

    let config = RegistryConfig::from_env_with_prefix("billing").unwrap();
    clear("BILLING");

    assert_eq!(config.history_capacity, 32);
    assert_eq!(config.slow_resolution_threshold(), Duration::from_millis(40));
    let resilience = config.default_resilience.clone().unwrap();
    assert_eq!(resilience.max_attempts, 3);
    assert_eq!(resilience.initial_delay_ms, 0);
    assert_eq!(resilience.backoff_factor, 1.0);

    let registry = ServiceRegistry::with_config(config).unwrap();
    assert_eq!(registry.default_resilience_policy().unwrap().max_attempts(), 3);
    assert_eq!(registry.slow_resolution_threshold(), Duration::from_millis(40));
}

#[test]
#[serial]
fn test_any_resilience_var_enables_default_policy() {
    clear("BILLING");
    env::set_var("BILLING_BACKOFF_FACTOR", "2.5");
    let config = RegistryConfig::from_env_with_prefix("BILLING_").unwrap();
    clear("BILLING");

    let resilience = config.default_resilience.unwrap();
    assert_eq!(resilience.max_attempts, 1);
    assert_eq!(resilience.backoff_factor, 2.5);
}

#[test]
#[serial]
fn test_invalid_env_values_are_config_errors() {
    clear("BILLING");
    env::set_var("BILLING_MAX_ATTEMPTS", "many");
    let result = RegistryConfig::from_env_with_prefix("BILLING");
    clear("BILLING");

    match result {
        Err(DiError::Config(message)) => assert!(message.starts_with("BILLING_MAX_ATTEMPTS=")),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
#[serial]
fn test_invalid_policy_from_env_fails_registry_creation() {
    clear("BILLING");
    env::set_var("BILLING_MAX_ATTEMPTS", "0");
    let config = RegistryConfig::from_env_with_prefix("BILLING").unwrap();
    clear("BILLING");

    assert!(matches!(
        ServiceRegistry::with_config(config),
        Err(DiError::InvalidPolicy(_))
    ));
}
