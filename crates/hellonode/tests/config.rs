//! Integration tests for configuration loading and startup argument handling.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use hellonode::config::ConfigError;
use hellonode::config::NodeConfig;
use hellonode::shell;
use hellonode::shell::StartupError;
use hellonode::shell::USAGE_MESSAGE;
use hellorpc::Address;

const ADDR_A: &str = "node:00112233445566778899aabbccddeeff00112233";
const ADDR_B: &str = "node:ffeeddccbbaa99887766554433221100ffeeddcc";

/// Writes `contents` to a fresh file under the temp dir.
fn temp_config(contents: &str) -> PathBuf {
    let name = format!("hellonode-{:016x}.json", rand::thread_rng().r#gen::<u64>());
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// --- Test 1: Parsing ---

#[test]
fn test_parse_full_config() {
    let text = format!(
        r#"{{
            "address": "{ADDR_A}",
            "listen": "127.0.0.1:7000",
            "peers": [ {{ "address": "{ADDR_B}", "endpoint": "127.0.0.1:7001" }} ],
            "rpc_timeout_secs": 5
        }}"#
    );
    let config = NodeConfig::parse(&text).unwrap();

    assert_eq!(config.address, Some(ADDR_A.parse::<Address>().unwrap()));
    assert_eq!(config.listen, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
    assert_eq!(config.peers.len(), 1);
    assert_eq!(config.peers[0].address, ADDR_B.parse::<Address>().unwrap());
    assert_eq!(config.rpc_timeout(), Duration::from_secs(5));
    assert_eq!(config.address_or_random(), ADDR_A.parse::<Address>().unwrap());
}

#[test]
fn test_parse_minimal_config_uses_defaults() {
    let config = NodeConfig::parse(r#"{ "listen": "0.0.0.0:0" }"#).unwrap();

    assert_eq!(config.address, None);
    assert!(config.peers.is_empty());
    assert_eq!(config.rpc_timeout(), Duration::from_secs(30));
    assert_ne!(config.address_or_random(), config.address_or_random());
}

#[test]
fn test_transport_knows_configured_peers() {
    let text = format!(r#"{{ "listen": "127.0.0.1:0", "peers": [ {{ "address": "{ADDR_B}", "endpoint": "127.0.0.1:7001" }} ] }}"#);
    let config = NodeConfig::parse(&text).unwrap();

    let transport = config.tcp_transport(Address::random());
    let peer: Address = ADDR_B.parse().unwrap();
    assert_eq!(transport.route(&peer), Some("127.0.0.1:7001".parse::<SocketAddr>().unwrap()));
    assert_eq!(transport.route(&Address::random()), None);
}

// --- Test 2: Rejections ---

#[test]
fn test_parse_rejects_malformed_documents() {
    let cases = [
        "not json",
        r#"{ "peers": [] }"#,
        r#"{ "listen": "nowhere" }"#,
        r#"{ "listen": "127.0.0.1:1", "address": "node:zz" }"#,
        r#"{ "listen": "127.0.0.1:1", "colour": "blue" }"#,
    ];
    for text in cases {
        let err = NodeConfig::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{:?} gave {:?}", text, err);
    }
}

#[test]
fn test_parse_rejects_unusable_values() {
    let zero = r#"{ "listen": "127.0.0.1:1", "rpc_timeout_secs": 0 }"#.to_string();
    let twice = format!(
        r#"{{ "listen": "127.0.0.1:1", "peers": [
            {{ "address": "{ADDR_B}", "endpoint": "127.0.0.1:2" }},
            {{ "address": "{ADDR_B}", "endpoint": "127.0.0.1:3" }} ] }}"#
    );
    let itself = format!(
        r#"{{ "address": "{ADDR_A}", "listen": "127.0.0.1:1", "peers": [
            {{ "address": "{ADDR_A}", "endpoint": "127.0.0.1:2" }} ] }}"#
    );

    for text in [zero, twice, itself] {
        let err = NodeConfig::parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{} gave {:?}", text, err);
    }
}

// --- Test 3: Loading from disk ---

#[test]
fn test_load_reads_file() {
    let path = temp_config(r#"{ "listen": "127.0.0.1:9" }"#);
    let config = NodeConfig::load(&path).unwrap();
    assert_eq!(config.listen, "127.0.0.1:9".parse::<SocketAddr>().unwrap());
    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_load_missing_file() {
    let path = std::env::temp_dir().join("hellonode-does-not-exist.json");
    assert!(matches!(NodeConfig::load(&path), Err(ConfigError::Missing(_))));
}

// --- Test 4: Startup messages ---

#[test]
fn test_startup_without_argument_is_usage_error() {
    let err = shell::load_config(["hw-echo"]).unwrap_err();
    assert!(matches!(err, StartupError::Usage));
    assert_eq!(err.to_string(), USAGE_MESSAGE);
}

#[test]
fn test_startup_with_missing_file_is_usage_error() {
    let err = shell::load_config(["hw-echo", "/definitely/not/here.json"]).unwrap_err();
    assert_eq!(err.to_string(), "First argument must be a node config");
}

#[test]
fn test_startup_with_bad_file_reports_reason() {
    let path = temp_config("{ broken");
    let err = shell::load_config(["hw-echo".into(), path.clone().into_os_string()]).unwrap_err();
    std::fs::remove_file(path).unwrap();

    assert!(matches!(err, StartupError::Config(ConfigError::Parse(_))));
    assert!(err.to_string().starts_with("Invalid node config file: "), "{}", err);
}

#[test]
fn test_startup_with_good_file() {
    let path = temp_config(r#"{ "listen": "127.0.0.1:0" }"#);
    let config = shell::load_config(["hw-forward".into(), path.clone().into_os_string()]).unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(config.listen.port(), 0);
}
