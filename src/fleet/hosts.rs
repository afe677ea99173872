//! Reachable hostnames for fleet nodes.
//!
//! Service URLs are built from one of two hosts: the public host (what end
//! users and browsers reach) and the admin host (cluster-internal traffic).
//! Clustered services use the cluster's virtual hostnames instead of the
//! node's own addresses.

use super::Node;
use crate::Result;

/// Derives reachable hostnames for a node.
pub trait HostLookup {
    /// Host to put in public URLs.
    ///
    /// `want_fqdn` forces a name instead of an address, as does TLS (the
    /// certificate has to match).
    fn public_host(&self, node: &Node, use_ssl: bool, use_cluster: bool, want_fqdn: bool)
    -> Result<String>;

    /// Host to put in admin and internal URLs.
    fn admin_host(&self, node: &Node, use_cluster: bool) -> Result<String>;
}

/// Host lookup over the crowbar network attributes.
///
/// Reads:
/// - `pacemaker.public_vhostname` / `pacemaker.admin_vhostname` for clustered nodes
/// - `crowbar.public_name`, falling back to `fqdn`, when a name is required
/// - `crowbar.network.public.address`, falling back to the admin address
/// - `crowbar.network.admin.address`, falling back to `ipaddress`
#[derive(Debug, Clone, Copy, Default)]
pub struct CrowbarHosts;

impl CrowbarHosts {
    fn admin_address(node: &Node) -> Result<String> {
        match node.attributes().get_str("crowbar.network.admin.address") {
            Some(address) => Ok(address.to_string()),
            None => node.require_str("ipaddress").map(str::to_string),
        }
    }
}

impl HostLookup for CrowbarHosts {
    fn public_host(
        &self,
        node: &Node,
        use_ssl: bool,
        use_cluster: bool,
        want_fqdn: bool,
    ) -> Result<String> {
        if use_cluster {
            return node
                .require_str("pacemaker.public_vhostname")
                .map(str::to_string);
        }
        if use_ssl || want_fqdn {
            return match node.attributes().get_str("crowbar.public_name") {
                Some(name) if !name.is_empty() => Ok(name.to_string()),
                _ => node.require_str("fqdn").map(str::to_string),
            };
        }
        match node.attributes().get_str("crowbar.network.public.address") {
            Some(address) => Ok(address.to_string()),
            None => Self::admin_address(node),
        }
    }

    fn admin_host(&self, node: &Node, use_cluster: bool) -> Result<String> {
        if use_cluster {
            return node
                .require_str("pacemaker.admin_vhostname")
                .map(str::to_string);
        }
        Self::admin_address(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::test_utils::{keystone_attrs, node};
    use serde_json::json;

    #[test]
    fn test_public_host_plain_uses_public_address() {
        let n = node("ks1", keystone_attrs("ks1", "10.0.0.5"));
        assert_eq!(
            CrowbarHosts.public_host(&n, false, false, false).unwrap(),
            "192.168.126.5"
        );
    }

    #[test]
    fn test_public_host_ssl_uses_fqdn() {
        let n = node("ks1", keystone_attrs("ks1", "10.0.0.5"));
        assert_eq!(
            CrowbarHosts.public_host(&n, true, false, false).unwrap(),
            "ks1.example.com"
        );
        assert_eq!(
            CrowbarHosts.public_host(&n, false, false, true).unwrap(),
            "ks1.example.com"
        );
    }

    #[test]
    fn test_public_host_prefers_public_name() {
        let mut attrs = keystone_attrs("ks1", "10.0.0.5");
        attrs["crowbar"]["public_name"] = json!("identity.cloud.example.org");
        let n = node("ks1", attrs);
        assert_eq!(
            CrowbarHosts.public_host(&n, true, false, false).unwrap(),
            "identity.cloud.example.org"
        );
    }

    #[test]
    fn test_cluster_hosts_use_vhostnames() {
        let mut attrs = keystone_attrs("ks1", "10.0.0.5");
        attrs["pacemaker"] = json!({
            "public_vhostname": "public-cluster-keystone.example.com",
            "admin_vhostname": "cluster-keystone.example.com"
        });
        let n = node("ks1", attrs);
        assert_eq!(
            CrowbarHosts.public_host(&n, false, true, false).unwrap(),
            "public-cluster-keystone.example.com"
        );
        assert_eq!(
            CrowbarHosts.admin_host(&n, true).unwrap(),
            "cluster-keystone.example.com"
        );
    }

    #[test]
    fn test_admin_host_falls_back_to_ipaddress() {
        let n = node("bare", json!({"ipaddress": "10.1.1.1"}));
        assert_eq!(CrowbarHosts.admin_host(&n, false).unwrap(), "10.1.1.1");
        assert_eq!(
            CrowbarHosts.public_host(&n, false, false, false).unwrap(),
            "10.1.1.1"
        );
    }

    #[test]
    fn test_missing_cluster_vhostname_is_an_error() {
        let n = node("ks1", keystone_attrs("ks1", "10.0.0.5"));
        match CrowbarHosts.admin_host(&n, true) {
            Err(Error::MissingAttribute { path, .. }) => {
                assert_eq!(path, "pacemaker.admin_vhostname")
            }
            other => panic!("Expected MissingAttribute, got: {:?}", other),
        }
    }
}
