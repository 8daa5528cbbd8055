// Node Configuration Tests
// Tests for NodeConfig validation

use ppdd::config::{ConfigError, NodeConfig, SUPPORTED_PROTOCOL_VERSION};
use ppdd::message::Role;

fn config(role: Role, version: &str) -> NodeConfig {
    NodeConfig::new(role, version)
        .with_listen("0.0.0.0:50051")
        .with_address(Role::Ping, "127.0.0.1:50051")
        .with_address(Role::Pong, "127.0.0.1:50052")
        .with_address(Role::Ding, "127.0.0.1:50053")
        .with_address(Role::Dong, "127.0.0.1:50054")
}

// ============================================================================
// VALID CONFIGS
// ============================================================================

#[test]
fn test_every_role_validates() {
    for role in Role::ALL {
        assert_eq!(config(role, SUPPORTED_PROTOCOL_VERSION).validate(), Ok(()));
    }
}

#[test]
fn test_validate_is_idempotent_and_pure() {
    let cfg = config(Role::Ping, SUPPORTED_PROTOCOL_VERSION);
    let before = cfg.clone();

    for _ in 0..3 {
        assert!(cfg.validate().is_ok());
    }
    assert_eq!(cfg, before);
}

#[test]
fn test_address_lookup() {
    let cfg = config(Role::Ding, SUPPORTED_PROTOCOL_VERSION);

    assert_eq!(cfg.address(Role::Dong), Some("127.0.0.1:50054"));
    assert_eq!(cfg.address(Role::Undefined), None);
}

// ============================================================================
// INVALID CONFIGS
// ============================================================================

#[test]
fn test_undefined_role_rejected() {
    let cfg = config(Role::Undefined, SUPPORTED_PROTOCOL_VERSION);

    assert_eq!(cfg.validate(), Err(ConfigError::UndefinedRole));
}

#[test]
fn test_empty_version_rejected() {
    let cfg = config(Role::Pong, "");

    assert_eq!(cfg.validate(), Err(ConfigError::MissingProtocolVersion));
}

#[test]
fn test_mismatched_version_rejected() {
    let cfg = config(Role::Pong, "v2");

    assert_eq!(
        cfg.validate(),
        Err(ConfigError::UnsupportedProtocolVersion {
            supported: SUPPORTED_PROTOCOL_VERSION.to_string(),
            configured: "v2".to_string(),
        })
    );
}

#[test]
fn test_role_checked_before_version() {
    let cfg = config(Role::Undefined, "v2");

    assert_eq!(cfg.validate(), Err(ConfigError::UndefinedRole));
}

#[test]
fn test_empty_address_rejected() {
    let cfg = config(Role::Ping, SUPPORTED_PROTOCOL_VERSION).with_address(Role::Ding, "");

    assert_eq!(cfg.validate(), Err(ConfigError::MissingAddress(Role::Ding)));
}

#[test]
fn test_with_role_switches_role() {
    let cfg = config(Role::Ping, SUPPORTED_PROTOCOL_VERSION).with_role(Role::Dong);

    assert_eq!(cfg.role, Role::Dong);
    assert!(cfg.validate().is_ok());
}
