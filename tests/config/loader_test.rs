// Endpoint Loader Tests
// Tests for resolving a NodeConfig from command-line flags

use clap::Parser;
use ppdd::config::{EndpointSettings, DEFAULT_PORTS, SUPPORTED_PROTOCOL_VERSION};
use ppdd::message::Role;

fn parse(args: &[&str]) -> EndpointSettings {
    let argv = std::iter::once("ppdd").chain(args.iter().copied());
    EndpointSettings::try_parse_from(argv).unwrap()
}

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_loopback_defaults() {
    let config = parse(&["--role", "ping"]).resolve();

    assert_eq!(config.role, Role::Ping);
    assert_eq!(config.protocol_version, SUPPORTED_PROTOCOL_VERSION);
    for (role, port) in Role::ALL.into_iter().zip(DEFAULT_PORTS) {
        assert_eq!(config.address(role), Some(format!("127.0.0.1:{}", port).as_str()));
    }
    assert_eq!(config.listen, "0.0.0.0:50051");
    assert!(config.validate().is_ok());
}

#[test]
fn test_listen_port_follows_role() {
    let settings = parse(&[]);

    assert_eq!(settings.listen_for(Role::Pong), "0.0.0.0:50052");
    assert_eq!(settings.listen_for(Role::Dong), "0.0.0.0:50054");
}

#[test]
fn test_role_flag_any_case() {
    assert_eq!(parse(&["--role", "DING"]).resolve().role, Role::Ding);
    assert_eq!(parse(&["--role", "Dong"]).resolve().role, Role::Dong);
}

#[test]
fn test_invalid_role_flag_rejected() {
    let result = EndpointSettings::try_parse_from(["ppdd", "--role", "foo"]);

    assert!(result.is_err());
}

// ============================================================================
// NAMESPACES
// ============================================================================

#[test]
fn test_namespace_selects_cluster_dns() {
    let config = parse(&["--role", "pong", "--namespace", "ppdd"]).resolve();

    assert_eq!(config.address(Role::Ping), Some("ping.ppdd.svc.cluster.local:50051"));
    assert_eq!(config.address(Role::Dong), Some("dong.ppdd.svc.cluster.local:50054"));
}

#[test]
fn test_localhost_namespace_is_loopback() {
    let settings = parse(&["--namespace", "LocalHost"]);

    assert!(settings.is_loopback());
    assert_eq!(settings.address_of(Role::Ding), "127.0.0.1:50053");
}

#[test]
fn test_service_names_and_ports_overridable() {
    let settings = parse(&[
        "--namespace",
        "prod",
        "--ding-svc",
        "bell",
        "--ding-port",
        "7000",
    ]);

    assert_eq!(settings.address_of(Role::Ding), "bell.prod.svc.cluster.local:7000");
}

// ============================================================================
// OVERRIDES
// ============================================================================

#[test]
fn test_explicit_address_wins() {
    let settings = parse(&["--namespace", "prod", "--pong-addr", "10.0.0.5:9000"]);

    assert_eq!(settings.address_of(Role::Pong), "10.0.0.5:9000");
    assert_eq!(settings.address_of(Role::Ping), "ping.prod.svc.cluster.local:50051");
}

#[test]
fn test_listen_override() {
    let config = parse(&["--role", "dong", "--listen", "127.0.0.1:0"]).resolve();

    assert_eq!(config.listen, "127.0.0.1:0");
}

#[test]
fn test_resolve_for_switches_role_only() {
    let settings = parse(&["--role", "ping"]);
    let ping = settings.resolve();
    let ding = settings.resolve_for(Role::Ding);

    assert_eq!(ding.role, Role::Ding);
    assert_eq!(ding.addresses, ping.addresses);
    assert_eq!(ding.listen, "0.0.0.0:50053");
}

#[test]
fn test_unsupported_api_version_fails_validation() {
    let config = parse(&["--role", "ping", "--api-version", "v2"]).resolve();

    assert!(config.validate().is_err());
}
