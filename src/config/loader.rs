// Endpoint Loader - Resolves a NodeConfig from CLI flags and environment variables
//
// Without a namespace (or with "localhost") every role lives on the loopback
// interface with its own port. With a namespace every role resolves to a
// cluster DNS name: <svc>.<namespace>.svc.cluster.local:<port>.

use crate::config::{NodeConfig, SUPPORTED_PROTOCOL_VERSION};
use crate::message::Role;
use clap::Parser;

/// Default port per role, in `Role::ALL` order
pub const DEFAULT_PORTS: [u16; 4] = [50051, 50052, 50053, 50054];

const LOOPBACK_HOST: &str = "127.0.0.1";
const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Raw, individually overridable endpoint settings
#[derive(Parser, Debug, Clone)]
pub struct EndpointSettings {
    /// Role this node plays: ping, pong, ding or dong
    #[arg(long, env = "PPDD_MODE")]
    pub role: Option<Role>,

    /// Protocol version to speak
    #[arg(long, env = "PPDD_API_VERSION", default_value = SUPPORTED_PROTOCOL_VERSION)]
    pub api_version: String,

    /// Cluster namespace; empty or "localhost" selects the loopback topology
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Address to bind the local transport to
    #[arg(long, env = "PPDD_LISTEN")]
    pub listen: Option<String>,

    #[arg(long, env = "PING_SVC", default_value = "ping")]
    pub ping_svc: String,
    #[arg(long, env = "PING_PORT", default_value_t = DEFAULT_PORTS[0])]
    pub ping_port: u16,
    #[arg(long, env = "PING_ADDR")]
    pub ping_addr: Option<String>,

    #[arg(long, env = "PONG_SVC", default_value = "pong")]
    pub pong_svc: String,
    #[arg(long, env = "PONG_PORT", default_value_t = DEFAULT_PORTS[1])]
    pub pong_port: u16,
    #[arg(long, env = "PONG_ADDR")]
    pub pong_addr: Option<String>,

    #[arg(long, env = "DING_SVC", default_value = "ding")]
    pub ding_svc: String,
    #[arg(long, env = "DING_PORT", default_value_t = DEFAULT_PORTS[2])]
    pub ding_port: u16,
    #[arg(long, env = "DING_ADDR")]
    pub ding_addr: Option<String>,

    #[arg(long, env = "DONG_SVC", default_value = "dong")]
    pub dong_svc: String,
    #[arg(long, env = "DONG_PORT", default_value_t = DEFAULT_PORTS[3])]
    pub dong_port: u16,
    #[arg(long, env = "DONG_ADDR")]
    pub dong_addr: Option<String>,
}

impl EndpointSettings {
    /// Check if addresses resolve to the loopback topology
    pub fn is_loopback(&self) -> bool {
        match self.namespace.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(ns) => ns.eq_ignore_ascii_case("localhost"),
        }
    }

    fn endpoint(&self, role: Role) -> (&str, u16, Option<&str>) {
        match role {
            Role::Ping => (&self.ping_svc, self.ping_port, self.ping_addr.as_deref()),
            Role::Pong => (&self.pong_svc, self.pong_port, self.pong_addr.as_deref()),
            Role::Ding => (&self.ding_svc, self.ding_port, self.ding_addr.as_deref()),
            Role::Dong => (&self.dong_svc, self.dong_port, self.dong_addr.as_deref()),
            Role::Undefined => ("", 0, None),
        }
    }

    /// Network address of the node playing `role`
    pub fn address_of(&self, role: Role) -> String {
        let (svc, port, addr) = self.endpoint(role);
        if let Some(addr) = addr.filter(|a| !a.is_empty()) {
            return addr.to_string();
        }
        match self.namespace.as_deref() {
            Some(ns) if !self.is_loopback() => {
                format!("{}.{}.{}:{}", svc, ns.trim(), CLUSTER_DOMAIN, port)
            }
            _ => format!("{}:{}", LOOPBACK_HOST, port),
        }
    }

    /// Bind address for a node playing `role`
    pub fn listen_for(&self, role: Role) -> String {
        match self.listen.as_deref().filter(|l| !l.is_empty()) {
            Some(listen) => listen.to_string(),
            None => format!("0.0.0.0:{}", self.endpoint(role).1),
        }
    }

    /// Resolve the configuration for the configured role
    pub fn resolve(&self) -> NodeConfig {
        self.resolve_for(self.role.unwrap_or_default())
    }

    /// Resolve the configuration as if this node played `role`
    pub fn resolve_for(&self, role: Role) -> NodeConfig {
        let mut config = NodeConfig::new(role, &self.api_version).with_listen(&self.listen_for(role));
        for peer in Role::ALL {
            config = config.with_address(peer, &self.address_of(peer));
        }
        config
    }
}
