//! Keystone settings bundles.
//!
//! A [`SettingsBundle`] is everything a service cookbook needs to talk to
//! Keystone: auth URLs in their several flavours, ports, admin and default
//! credentials, TLS and federation flags. Bundles are derived from the node
//! that hosts the requested instance, built once per (instance, generation)
//! and shared; the caller's own service account is layered on top of the
//! shared base on every call and never cached.

pub mod schema;
pub mod urls;

use std::ops::Deref;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{Error, Result};
use crate::fleet::{CrowbarHosts, FleetSearch, HostLookup, Node, NodeHandle, NodeQuery};
use crate::resolver::{DEFAULT_INSTANCE, EpochCache, Generation, InstanceKey, InstanceResolver};

use schema::{HorizonAttributes, KeystoneAttributes, Protocol};
use urls::{join_url, middleware_version, service_url, versioned_service_url};

/// Role carried by dashboard nodes.
pub const DASHBOARD_ROLE: &str = "horizon-server";

/// Path appended to a dashboard's public URL to form its WebSSO endpoint.
pub const WEBSSO_DASHBOARD_PATH: &str = "/auth/websso/";

/// Domain name and id used for admin and default users.
pub const DEFAULT_DOMAIN: &str = "Default";
pub const DEFAULT_DOMAIN_ID: &str = "default";

/// Instance-scoped Keystone settings. Never modified after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsBundle {
    pub api_version: Value,
    pub api_version_for_middleware: String,
    pub admin_auth_url: String,
    pub public_auth_url: String,
    pub websso_keystone_url: String,
    pub internal_auth_url: String,
    pub unversioned_internal_auth_url: String,
    pub use_ssl: bool,
    pub endpoint_region: Option<String>,
    pub insecure: bool,
    pub protocol: String,
    pub public_url_host: String,
    pub internal_url_host: String,
    pub service_port: u16,
    pub admin_port: u16,
    pub admin_token: Option<String>,
    pub admin_project: String,
    pub admin_tenant: String,
    pub admin_user: String,
    pub admin_domain: String,
    pub admin_domain_id: String,
    pub admin_password: String,
    pub default_project: Option<String>,
    pub default_tenant: Option<String>,
    pub default_user: Option<String>,
    pub default_user_domain: Option<String>,
    pub default_user_domain_id: Option<String>,
    pub default_password: Option<String>,
    pub service_project: String,
    pub service_tenant: String,
    pub websso_enabled: bool,
    pub trusted_dashboards: Vec<String>,
}

/// Service account of the calling cookbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccount {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ServiceAccount {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    /// Read `<cookbook>.service_user` / `<cookbook>.service_password` from a node.
    pub fn from_node(node: &Node, cookbook: &str) -> Self {
        let attrs = node.attributes();
        Self {
            user: attrs
                .get_str(&format!("{}.service_user", cookbook))
                .map(str::to_string),
            password: attrs
                .get_str(&format!("{}.service_password", cookbook))
                .map(str::to_string),
        }
    }
}

/// A shared bundle plus the caller's service account.
#[derive(Debug, Clone)]
pub struct Settings {
    base: Arc<SettingsBundle>,
    pub service_user: Option<String>,
    pub service_password: Option<String>,
}

impl Settings {
    /// The shared, cached part.
    pub fn base(&self) -> &Arc<SettingsBundle> {
        &self.base
    }
}

impl Deref for Settings {
    type Target = SettingsBundle;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Flat<'a> {
            #[serde(flatten)]
            base: &'a SettingsBundle,
            service_user: &'a Option<String>,
            service_password: &'a Option<String>,
        }

        Flat {
            base: &self.base,
            service_user: &self.service_user,
            service_password: &self.service_password,
        }
        .serialize(serializer)
    }
}

/// Builds and caches settings bundles per instance.
#[derive(Debug)]
pub struct SettingsBuilder<S, H = CrowbarHosts> {
    resolver: InstanceResolver<S>,
    hosts: H,
    bundles: EpochCache<Arc<SettingsBundle>>,
    scratch: Map<String, Value>,
}

impl<S: FleetSearch> SettingsBuilder<S, CrowbarHosts> {
    pub fn new(search: S) -> Self {
        Self::with_hosts(search, CrowbarHosts)
    }
}

impl<S: FleetSearch, H: HostLookup> SettingsBuilder<S, H> {
    pub fn with_hosts(search: S, hosts: H) -> Self {
        Self {
            resolver: InstanceResolver::new(search),
            hosts,
            bundles: EpochCache::new(),
            scratch: Map::new(),
        }
    }

    pub fn resolver(&self) -> &InstanceResolver<S> {
        &self.resolver
    }

    /// Settings for `instance`, with `account` layered on top.
    pub fn settings(
        &mut self,
        local: &NodeHandle,
        instance: &InstanceKey,
        generation: &Generation,
        account: ServiceAccount,
    ) -> Result<Settings> {
        self.settings_on_behalf_of(local, instance, generation, account, local.name())
    }

    /// Settings for a cookbook running on `local`.
    ///
    /// The instance comes from `<cookbook>.keystone_instance` (default
    /// `"default"`), the service account from `<cookbook>.service_user` and
    /// `<cookbook>.service_password`.
    pub fn settings_for_cookbook(
        &mut self,
        local: &NodeHandle,
        cookbook: &str,
        generation: &Generation,
    ) -> Result<Settings> {
        let instance = cookbook_instance(local, cookbook);
        let account = ServiceAccount::from_node(local, cookbook);
        self.settings_on_behalf_of(local, &instance, generation, account, cookbook)
    }

    /// The `keystone.osprofiler` subtree of the node hosting the cookbook's instance.
    pub fn profiler_settings(
        &mut self,
        local: &NodeHandle,
        cookbook: &str,
        generation: &Generation,
    ) -> Value {
        let instance = cookbook_instance(local, cookbook);
        let node = self.resolver.resolve(local, &instance, generation);
        node.attributes()
            .get("keystone.osprofiler")
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Generation-scoped scratch values shared between callers.
    pub fn scratch(&self) -> &Map<String, Value> {
        &self.scratch
    }

    /// Merge `update` into the scratch values.
    pub fn scratch_update(&mut self, update: Map<String, Value>) {
        self.scratch.extend(update);
    }

    pub fn scratch_reset(&mut self) {
        self.scratch.clear();
    }

    fn settings_on_behalf_of(
        &mut self,
        local: &NodeHandle,
        instance: &InstanceKey,
        generation: &Generation,
        account: ServiceAccount,
        requester: &str,
    ) -> Result<Settings> {
        self.begin_epoch(generation, requester);

        let base = match self.bundles.get(instance) {
            Some(bundle) => bundle.clone(),
            None => {
                let node = self.resolver.resolve(local, instance, generation);
                let bundle = Arc::new(self.build(&node)?);
                self.bundles.insert(instance.clone(), bundle.clone());
                bundle
            }
        };

        Ok(Settings {
            base,
            service_user: account.user,
            service_password: account.password,
        })
    }

    fn begin_epoch(&mut self, generation: &Generation, requester: &str) {
        if self.bundles.generation() == Some(generation) {
            return;
        }
        if !self.bundles.is_empty() {
            info!("Invalidating keystone settings cache on behalf of {}", requester);
        }
        self.bundles.advance(generation);
        self.scratch_reset();
    }

    fn build(&self, node: &Node) -> Result<SettingsBundle> {
        let attrs = KeystoneAttributes::from_node(node)?;
        let api = &attrs.api;
        let ha_enabled = attrs.ha.enabled;
        let use_ssl = attrs.use_ssl();

        let public_host = self.hosts.public_host(node, use_ssl, ha_enabled, false)?;
        let admin_host = self.hosts.admin_host(node, ha_enabled)?;
        let version = api.version.text();

        let public_auth_url =
            versioned_service_url(api.protocol, &public_host, api.service_port, &version);
        let default_user = attrs.default_user();

        Ok(SettingsBundle {
            api_version: api.version.raw().clone(),
            api_version_for_middleware: middleware_version(api.version.number()),
            admin_auth_url: service_url(api.protocol, &admin_host, api.admin_port),
            public_auth_url,
            websso_keystone_url: self.websso_keystone_url(node, &attrs)?,
            internal_auth_url: versioned_service_url(
                api.protocol,
                &admin_host,
                api.service_port,
                &version,
            ),
            unversioned_internal_auth_url: service_url(api.protocol, &admin_host, api.service_port),
            use_ssl,
            endpoint_region: api.region.clone(),
            insecure: use_ssl && attrs.ssl.insecure,
            protocol: api.protocol.to_string(),
            public_url_host: public_host,
            internal_url_host: admin_host,
            service_port: api.service_port,
            admin_port: api.admin_port,
            admin_token: attrs.service.token.clone(),
            admin_project: attrs.admin.project.clone(),
            admin_tenant: attrs.admin.project.clone(),
            admin_user: attrs.admin.username.clone(),
            admin_domain: DEFAULT_DOMAIN.to_string(),
            admin_domain_id: DEFAULT_DOMAIN_ID.to_string(),
            admin_password: attrs.admin.password.clone(),
            default_project: attrs.default.project.clone(),
            default_tenant: attrs.default.project.clone(),
            default_user_domain: default_user.as_ref().map(|_| DEFAULT_DOMAIN.to_string()),
            default_user_domain_id: default_user.as_ref().map(|_| DEFAULT_DOMAIN_ID.to_string()),
            default_password: default_user.as_ref().and_then(|u| u.password.clone()),
            default_user: default_user.map(|u| u.username),
            service_project: attrs.service.project.clone(),
            service_tenant: attrs.service.project.clone(),
            websso_enabled: attrs.federation.openidc.enabled,
            trusted_dashboards: self.trusted_dashboards(&attrs)?,
        })
    }

    /// Configured override, or the public versioned auth URL on the node's FQDN.
    fn websso_keystone_url(&self, node: &Node, attrs: &KeystoneAttributes) -> Result<String> {
        let configured = &attrs.federation.websso_keystone_url;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }
        let public_fqdn = self
            .hosts
            .public_host(node, attrs.use_ssl(), attrs.ha.enabled, true)?;
        Ok(versioned_service_url(
            attrs.api.protocol,
            &public_fqdn,
            attrs.api.service_port,
            &attrs.api.version.text(),
        ))
    }

    /// Configured dashboards, or one derived from the first dashboard node.
    fn trusted_dashboards(&self, attrs: &KeystoneAttributes) -> Result<Vec<String>> {
        let configured = &attrs.federation.trusted_dashboards;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }

        let mut dashboards = configured.clone();
        let query = NodeQuery::new().with_role(DASHBOARD_ROLE);
        if let Some(dashboard) = self.resolver.search().find(&query).into_iter().next() {
            if let Some(url) = self.dashboard_websso_url(&dashboard)? {
                debug!("Derived trusted dashboard {} from {}", url, dashboard.name());
                dashboards.push(url);
            }
        }
        Ok(dashboards)
    }

    /// `<proto>://<public fqdn>/auth/websso/` for a dashboard node that serves
    /// through apache; `None` otherwise.
    fn dashboard_websso_url(&self, dashboard: &Node) -> Result<Option<String>> {
        let horizon: HorizonAttributes = dashboard
            .attributes()
            .subtree("horizon")
            .map_err(|e| Error::InvalidAttribute {
                node: dashboard.name().to_string(),
                message: format!("horizon: {}", e),
            })?
            .unwrap_or_default();
        let Some(apache) = horizon.apache else {
            return Ok(None);
        };

        let protocol = if apache.ssl {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let public_fqdn = self
            .hosts
            .public_host(dashboard, apache.ssl, horizon.ha.enabled, true)?;
        let base = format!("{}://{}", protocol, public_fqdn);
        Ok(Some(join_url(&base, WEBSSO_DASHBOARD_PATH)))
    }
}

/// Instance named by `<cookbook>.keystone_instance` on `local`, or the default.
pub fn cookbook_instance(local: &Node, cookbook: &str) -> InstanceKey {
    let label = local
        .attributes()
        .get_str(&format!("{}.keystone_instance", cookbook))
        .unwrap_or(DEFAULT_INSTANCE);
    InstanceKey::new(label)
}
