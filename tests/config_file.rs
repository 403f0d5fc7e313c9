use std::io::Write;
use std::time::Duration;

use dut_harness_lib::config::{ConfigError, HarnessConfig};
use dut_harness_lib::reachability::ReachabilityPolicy;

#[test]
fn test_read_bench_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[power_supply]
vendor_id = 0x10C4
product_id = 0xEA60
baud_rate = 9600
settle_secs = 8.5

[target]
host = "192.168.178.20"
attempts = 20
delay_secs = 2

[restart]
within_secs = 4.0
delay_secs = 0.2
"#
    )
    .unwrap();

    let config = HarnessConfig::read(file.path()).expect("config parses");

    assert_eq!(config.settle().unwrap(), Duration::from_millis(8500));
    assert_eq!(config.target_host().unwrap().to_string(), "192.168.178.20");
    assert_eq!(
        config.boot_policy().unwrap(),
        ReachabilityPolicy::new(Duration::from_secs(2), 20, Duration::from_secs(2)).unwrap()
    );
    assert_eq!(config.restart_window().unwrap().duration(), Duration::from_secs(4));
    assert_eq!(config.restart_policy().unwrap().attempts(), 50);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        HarnessConfig::load(Some(&missing)),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_unknown_parity_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[power_supply]\nparity = \"M\"").unwrap();

    let config = HarnessConfig::read(file.path()).unwrap();
    assert!(matches!(config.port_settings(), Err(ConfigError::Invalid(_))));
}
