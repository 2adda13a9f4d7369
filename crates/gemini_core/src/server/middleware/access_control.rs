//! IP allow/deny-list middleware, keyed on CIDR ranges.

use std::net::IpAddr;

use async_trait::async_trait;
use ipnet::IpNet;

use crate::response::Response;
use crate::server::middleware::{Decision, Middleware};

#[derive(Debug, Clone, Default)]
pub struct AccessControlConfig {
    pub allow_list: Vec<String>,
    pub deny_list: Vec<String>,
    pub default_allow: bool,
}

impl AccessControlConfig {
    pub fn new(default_allow: bool) -> Self {
        AccessControlConfig {
            allow_list: Vec::new(),
            deny_list: Vec::new(),
            default_allow,
        }
    }
}

fn parse_entries(entries: &[String]) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .parse::<IpNet>()
                .ok()
                .or_else(|| entry.parse::<IpAddr>().ok().map(IpNet::from))
        })
        .collect()
}

fn matches_any(nets: &[IpNet], addr: IpAddr) -> bool {
    nets.iter().any(|net| net.contains(&addr))
}

pub struct AccessControl {
    allow_list: Vec<IpNet>,
    deny_list: Vec<IpNet>,
    default_allow: bool,
}

impl AccessControl {
    pub fn new(config: AccessControlConfig) -> Self {
        AccessControl {
            allow_list: parse_entries(&config.allow_list),
            deny_list: parse_entries(&config.deny_list),
            default_allow: config.default_allow,
        }
    }
}

#[async_trait]
impl Middleware for AccessControl {
    async fn process_request(
        &self,
        _uri: &str,
        remote_addr: IpAddr,
        _client_cert_fingerprint: Option<&str>,
    ) -> Decision {
        // Deny list always wins, even over an address that also matches the allow list.
        if matches_any(&self.deny_list, remote_addr) {
            return Decision::Deny(Response::new(53, "Access denied", None));
        }

        if !self.allow_list.is_empty() {
            return if matches_any(&self.allow_list, remote_addr) {
                Decision::Allow
            } else {
                Decision::Deny(Response::new(53, "Access denied", None))
            };
        }

        if self.default_allow {
            Decision::Allow
        } else {
            Decision::Deny(Response::new(53, "Access denied", None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn allow_list_admits_matching_cidr() {
        let acl = AccessControl::new(AccessControlConfig {
            allow_list: vec!["192.168.1.0/24".into()],
            default_allow: false,
            ..Default::default()
        });
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.100"), None).await,
            Decision::Allow
        ));
        assert!(matches!(
            acl.process_request("gemini://t/", ip("10.0.0.1"), None).await,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn deny_list_blocks_matching_cidr() {
        let acl = AccessControl::new(AccessControlConfig {
            deny_list: vec!["203.0.113.0/24".into()],
            default_allow: true,
            ..Default::default()
        });
        assert!(matches!(
            acl.process_request("gemini://t/", ip("203.0.113.50"), None).await,
            Decision::Deny(_)
        ));
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.1"), None).await,
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn single_ip_entries_match_exactly() {
        let acl = AccessControl::new(AccessControlConfig {
            allow_list: vec!["192.168.1.100".into()],
            default_allow: false,
            ..Default::default()
        });
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.100"), None).await,
            Decision::Allow
        ));
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.101"), None).await,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn default_policy_applies_with_no_lists() {
        let allow = AccessControl::new(AccessControlConfig::new(true));
        assert!(matches!(
            allow.process_request("gemini://t/", ip("192.168.1.1"), None).await,
            Decision::Allow
        ));

        let deny = AccessControl::new(AccessControlConfig::new(false));
        assert!(matches!(
            deny.process_request("gemini://t/", ip("192.168.1.1"), None).await,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn deny_list_overrides_allow_list() {
        let acl = AccessControl::new(AccessControlConfig {
            allow_list: vec!["192.168.1.0/24".into()],
            deny_list: vec!["192.168.1.100".into()],
            default_allow: false,
        });
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.100"), None).await,
            Decision::Deny(_)
        ));
        assert!(matches!(
            acl.process_request("gemini://t/", ip("192.168.1.50"), None).await,
            Decision::Allow
        ));
    }
}
