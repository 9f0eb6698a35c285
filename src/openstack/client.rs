//! OpenStack API client implementation.
//!
//! This module provides the HTTP client for the Keystone v3, Neutron v2.0,
//! Nova v2.1 and Glance v2 REST APIs.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::OpenStackCredentials;
use crate::error::{CloudError, ConfigError, Result, TopologyError};

use super::connection::CloudConnection;
use super::types::{
    CreateFloatingIpRequest, CreatePortRequest, CreateRouterRequest,
    CreateSecurityGroupRuleRequest, CreateServerRequest, CreateSubnetRequest, Flavor, FloatingIp,
    Image, KeyPair, Network, NewKeyPair, Port, Router, SecurityGroup, SecurityGroupRule, Server,
    Subnet,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Header carrying the Keystone token.
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header Keystone returns the new token in.
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Base URLs of the services the tool talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Neutron, including the `/v2.0` suffix.
    pub network: String,
    /// Nova, as listed in the catalog.
    pub compute: String,
    /// Glance, including the `/v2` suffix.
    pub image: String,
}

/// OpenStack API client.
#[derive(Clone)]
pub struct OpenStackClient {
    /// HTTP client.
    client: Client,
    /// Keystone token.
    token: String,
    /// Resolved service endpoints.
    endpoints: ServiceEndpoints,
}

impl std::fmt::Debug for OpenStackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Keystone catalog entry.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

/// One endpoint of a catalog entry.
#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| CloudError::network(format!("Failed to create HTTP client: {e}")).into())
}

fn with_suffix(url: &str, suffix: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with(suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    }
}

/// Picks the endpoint of a service for the region and interface.
fn resolve_endpoint(
    catalog: &[CatalogEntry],
    service_type: &str,
    region: &str,
    interface: &str,
) -> Result<String> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service_type)
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| {
            endpoint.interface == interface
                && (endpoint.region_id.as_deref() == Some(region)
                    || endpoint.region.as_deref() == Some(region))
        })
        .map(|endpoint| endpoint.url.clone())
        .ok_or_else(|| {
            CloudError::ServiceNotInCatalog {
                service: service_type.to_string(),
                region: region.to_string(),
            }
            .into()
        })
}

/// Turns "not there" faults of a lookup into `None`.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_wire_fault() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Reduces a name query result to at most one match.
fn single<T>(mut matches: Vec<T>, kind: &str, name: &str) -> Result<Option<T>> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(CloudError::Ambiguous {
            kind: kind.to_string(),
            name: name.to_string(),
            count,
        }
        .into()),
    }
}

impl OpenStackClient {
    /// Authenticates with Keystone and resolves the service endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails or a service is missing from
    /// the catalog.
    pub async fn connect(credentials: &OpenStackCredentials, interface: &str) -> Result<Self> {
        if credentials.identity_api_version.trim() != "3" {
            return Err(ConfigError::validation(
                format!(
                    "Identity API version {} is not supported, use 3",
                    credentials.identity_api_version
                ),
                "OS_IDENTITY_API_VERSION",
            )
            .into());
        }

        let client = build_http_client()?;
        let url = format!("{}/auth/tokens", credentials.identity_v3_url());
        info!("Authenticating with {url}");

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": credentials.username,
                            "domain": { "name": credentials.user_domain_name },
                            "password": credentials.password,
                        }
                    }
                },
                "scope": {
                    "project": { "id": credentials.project_id }
                }
            }
        });

        let response = client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CloudError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CloudError::AuthenticationFailed {
                message: String::from("Keystone rejected the credentials"),
            }
            .into());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::api_error(status.as_u16(), text).into());
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| CloudError::AuthenticationFailed {
                message: String::from("No token in Keystone response"),
            })?;

        #[derive(Deserialize)]
        struct TokenResponse {
            token: TokenBody,
        }
        #[derive(Deserialize)]
        struct TokenBody {
            #[serde(default)]
            catalog: Vec<CatalogEntry>,
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            CloudError::InvalidResponse {
                message: format!("Failed to parse token response: {e}"),
            }
        })?;

        let region = &credentials.region_name;
        let catalog = &parsed.token.catalog;
        let endpoints = ServiceEndpoints {
            network: with_suffix(&resolve_endpoint(catalog, "network", region, interface)?, "/v2.0"),
            compute: resolve_endpoint(catalog, "compute", region, interface)?
                .trim_end_matches('/')
                .to_string(),
            image: with_suffix(&resolve_endpoint(catalog, "image", region, interface)?, "/v2"),
        };
        debug!("Resolved endpoints: {endpoints:?}");

        Self::with_endpoints(token, endpoints)
    }

    /// Creates a client from an existing token and endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoints(token: impl Into<String>, endpoints: ServiceEndpoints) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            token: token.into(),
            endpoints,
        })
    }

    /// Resolved endpoints.
    #[must_use]
    pub const fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    fn url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{base}{path}")).map_err(|e| {
            TopologyError::Cloud(CloudError::InvalidRequest {
                message: format!("Invalid URL {base}{path}: {e}"),
            })
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Executes a request, retrying transient failures.
    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Option<Value>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.execute_once(method.clone(), url.clone(), body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TopologyError::Cloud(CloudError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request. Empty bodies come back as `None`.
    async fn execute_once(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Option<Value>> {
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, url.clone())
            .header(AUTH_TOKEN_HEADER, &self.token)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloudError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after: u64 = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(CloudError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CloudError::AuthenticationFailed {
                message: format!("Token rejected for {}", url.path()),
            }
            .into());
        }

        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::InvalidRequest { message: text }.into());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::not_found("resource", url.path()).into());
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::api_error(status.as_u16(), text).into());
        }

        let text = response.text().await.map_err(|e| {
            CloudError::InvalidResponse {
                message: format!("Failed to read response: {e}"),
            }
        })?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text).map(Some).map_err(|e| {
            CloudError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }

    /// Executes a request and decodes the field `key` of the response body.
    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        key: &str,
    ) -> Result<T> {
        let value = self.execute(method, url, body).await?.ok_or_else(|| {
            TopologyError::Cloud(CloudError::InvalidResponse {
                message: format!("Empty response, expected '{key}'"),
            })
        })?;
        let field = value.get(key).cloned().ok_or_else(|| {
            TopologyError::Cloud(CloudError::InvalidResponse {
                message: format!("Response has no '{key}' field"),
            })
        })?;
        serde_json::from_value(field).map_err(|e| {
            CloudError::InvalidResponse {
                message: format!("Failed to decode '{key}': {e}"),
            }
            .into()
        })
    }

    /// Executes a request whose response body is irrelevant.
    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<()> {
        self.execute(method, url, body).await.map(|_| ())
    }

    /// Finds a Neutron resource by name, falling back to id.
    ///
    /// `collection` is the URL segment and `list_key` the field the list
    /// comes back under. They differ for dashed collections such as
    /// `security-groups`.
    async fn find_neutron<T: DeserializeOwned>(
        &self,
        collection: &str,
        list_key: &str,
        singular: &str,
        name_or_id: &str,
    ) -> Result<Option<T>> {
        let base = &self.endpoints.network;
        let url = Self::url(base, &format!("/{collection}"), &[("name", name_or_id)])?;
        let matches: Vec<T> = self.fetch(Method::GET, url, None, list_key).await?;
        if let Some(found) = single(matches, singular, name_or_id)? {
            return Ok(Some(found));
        }

        let url = Self::url(base, &format!("/{collection}/{name_or_id}"), &[])?;
        optional(self.fetch(Method::GET, url, None, singular).await)
    }

    async fn neutron_create<T: DeserializeOwned>(&self, collection: &str, singular: &str, body: Value) -> Result<T> {
        let url = Self::url(&self.endpoints.network, &format!("/{collection}"), &[])?;
        self.fetch(Method::POST, url, Some(&json!({ singular: body })), singular)
            .await
    }

    async fn neutron_delete(&self, collection: &str, id: &str) -> Result<()> {
        let url = Self::url(&self.endpoints.network, &format!("/{collection}/{id}"), &[])?;
        self.send(Method::DELETE, url, None).await
    }

    async fn router_interface(
        &self,
        action: &str,
        router_id: &str,
        subnet_id: &str,
        port_id: Option<String>,
    ) -> Result<()> {
        let body = match port_id {
            Some(port_id) => json!({ "port_id": port_id }),
            None => json!({ "subnet_id": subnet_id }),
        };
        let url = Self::url(
            &self.endpoints.network,
            &format!("/routers/{router_id}/{action}"),
            &[],
        )?;
        self.send(Method::PUT, url, Some(&body)).await
    }

    async fn server_action(&self, server_id: &str, body: &Value) -> Result<()> {
        let url = Self::url(&self.endpoints.compute, &format!("/servers/{server_id}/action"), &[])?;
        self.send(Method::POST, url, Some(body)).await
    }

    fn to_value<T: serde::Serialize>(request: &T) -> Result<Value> {
        serde_json::to_value(request).map_err(|e| TopologyError::internal(format!("Failed to encode request: {e}")))
    }
}

#[async_trait]
impl CloudConnection for OpenStackClient {
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Router>> {
        self.find_neutron("routers", "routers", "router", name_or_id).await
    }

    async fn create_router(&self, request: &CreateRouterRequest) -> Result<Router> {
        self.neutron_create("routers", "router", Self::to_value(request)?)
            .await
    }

    async fn delete_router(&self, router_id: &str) -> Result<()> {
        self.neutron_delete("routers", router_id).await
    }

    async fn add_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
        port_id: Option<String>,
    ) -> Result<()> {
        self.router_interface("add_router_interface", router_id, subnet_id, port_id)
            .await
    }

    async fn remove_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
        port_id: Option<String>,
    ) -> Result<()> {
        self.router_interface("remove_router_interface", router_id, subnet_id, port_id)
            .await
    }

    async fn find_network(&self, name_or_id: &str) -> Result<Option<Network>> {
        self.find_neutron("networks", "networks", "network", name_or_id).await
    }

    async fn create_network(&self, name: &str) -> Result<Network> {
        self.neutron_create("networks", "network", json!({ "name": name, "admin_state_up": true }))
            .await
    }

    async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.neutron_delete("networks", network_id).await
    }

    async fn find_subnet(&self, name_or_id: &str) -> Result<Option<Subnet>> {
        self.find_neutron("subnets", "subnets", "subnet", name_or_id).await
    }

    async fn create_subnet(&self, request: &CreateSubnetRequest) -> Result<Subnet> {
        self.neutron_create("subnets", "subnet", Self::to_value(request)?)
            .await
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.neutron_delete("subnets", subnet_id).await
    }

    async fn list_ports(&self) -> Result<Vec<Port>> {
        let url = Self::url(&self.endpoints.network, "/ports", &[])?;
        self.fetch(Method::GET, url, None, "ports").await
    }

    async fn list_ports_for_device(&self, device_id: &str) -> Result<Vec<Port>> {
        let url = Self::url(&self.endpoints.network, "/ports", &[("device_id", device_id)])?;
        self.fetch(Method::GET, url, None, "ports").await
    }

    async fn create_port(&self, request: &CreatePortRequest) -> Result<Port> {
        self.neutron_create("ports", "port", Self::to_value(request)?).await
    }

    async fn delete_port(&self, port_id: &str) -> Result<()> {
        self.neutron_delete("ports", port_id).await
    }

    async fn find_server(&self, name_or_id: &str) -> Result<Option<Server>> {
        let pattern = format!("^{name_or_id}$");
        let url = Self::url(&self.endpoints.compute, "/servers/detail", &[("name", &pattern)])?;
        let servers: Vec<Server> = self.fetch(Method::GET, url, None, "servers").await?;
        let exact: Vec<Server> = servers
            .into_iter()
            .filter(|server| server.name == name_or_id)
            .collect();
        if let Some(found) = single(exact, "server", name_or_id)? {
            return Ok(Some(found));
        }

        optional(self.get_server(name_or_id).await)
    }

    async fn get_server(&self, server_id: &str) -> Result<Server> {
        let url = Self::url(&self.endpoints.compute, &format!("/servers/{server_id}"), &[])?;
        self.fetch(Method::GET, url, None, "server").await
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server> {
        let mut server = json!({
            "name": request.name,
            "imageRef": request.image_ref,
            "flavorRef": request.flavor_ref,
            "networks": request
                .networks
                .iter()
                .map(|id| json!({ "uuid": id }))
                .collect::<Vec<_>>(),
        });
        if let Some(key_name) = &request.key_name {
            server["key_name"] = json!(key_name);
        }
        if !request.security_groups.is_empty() {
            server["security_groups"] = json!(request
                .security_groups
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>());
        }

        let url = Self::url(&self.endpoints.compute, "/servers", &[])?;
        let mut created: Server = self
            .fetch(Method::POST, url, Some(&json!({ "server": server })), "server")
            .await?;
        if created.name.is_empty() {
            created.name.clone_from(&request.name);
        }
        Ok(created)
    }

    async fn stop_server(&self, server_id: &str) -> Result<()> {
        self.server_action(server_id, &json!({ "os-stop": null })).await
    }

    async fn delete_server(&self, server_id: &str) -> Result<()> {
        let url = Self::url(&self.endpoints.compute, &format!("/servers/{server_id}"), &[])?;
        self.send(Method::DELETE, url, None).await
    }

    async fn add_floating_ip_to_server(&self, server_id: &str, address: &str) -> Result<()> {
        self.server_action(server_id, &json!({ "addFloatingIp": { "address": address } }))
            .await
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        let url = Self::url(&self.endpoints.network, "/floatingips", &[])?;
        self.fetch(Method::GET, url, None, "floatingips").await
    }

    async fn create_floating_ip(&self, request: &CreateFloatingIpRequest) -> Result<FloatingIp> {
        self.neutron_create("floatingips", "floatingip", Self::to_value(request)?)
            .await
    }

    async fn delete_floating_ip(&self, floating_ip_id: &str) -> Result<()> {
        self.neutron_delete("floatingips", floating_ip_id).await
    }

    async fn find_image(&self, name_or_id: &str) -> Result<Option<Image>> {
        let url = Self::url(&self.endpoints.image, "/images", &[("name", name_or_id)])?;
        let images: Vec<Image> = self.fetch(Method::GET, url, None, "images").await?;
        if let Some(found) = single(images, "image", name_or_id)? {
            return Ok(Some(found));
        }

        // Glance returns the image document itself, without a wrapper.
        let url = Self::url(&self.endpoints.image, &format!("/images/{name_or_id}"), &[])?;
        let Some(value) = optional(self.execute(Method::GET, url, None).await)?.flatten() else {
            return Ok(None);
        };
        serde_json::from_value(value).map(Some).map_err(|e| {
            CloudError::InvalidResponse {
                message: format!("Failed to decode image: {e}"),
            }
            .into()
        })
    }

    async fn find_flavor(&self, name_or_id: &str) -> Result<Option<Flavor>> {
        let url = Self::url(&self.endpoints.compute, "/flavors/detail", &[])?;
        let flavors: Vec<Flavor> = self.fetch(Method::GET, url, None, "flavors").await?;
        let named: Vec<Flavor> = flavors
            .into_iter()
            .filter(|flavor| flavor.name == name_or_id)
            .collect();
        if let Some(found) = single(named, "flavor", name_or_id)? {
            return Ok(Some(found));
        }

        let url = Self::url(&self.endpoints.compute, &format!("/flavors/{name_or_id}"), &[])?;
        optional(self.fetch(Method::GET, url, None, "flavor").await)
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        #[derive(Deserialize)]
        struct Entry {
            keypair: KeyPair,
        }

        let url = Self::url(&self.endpoints.compute, "/os-keypairs", &[])?;
        let entries: Vec<Entry> = self.fetch(Method::GET, url, None, "keypairs").await?;
        Ok(entries.into_iter().map(|entry| entry.keypair).collect())
    }

    async fn find_key_pair(&self, name: &str) -> Result<Option<KeyPair>> {
        let url = Self::url(&self.endpoints.compute, &format!("/os-keypairs/{name}"), &[])?;
        optional(self.fetch(Method::GET, url, None, "keypair").await)
    }

    async fn create_key_pair(&self, name: &str) -> Result<NewKeyPair> {
        let url = Self::url(&self.endpoints.compute, "/os-keypairs", &[])?;
        self.fetch(
            Method::POST,
            url,
            Some(&json!({ "keypair": { "name": name } })),
            "keypair",
        )
        .await
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        let url = Self::url(&self.endpoints.compute, &format!("/os-keypairs/{name}"), &[])?;
        self.send(Method::DELETE, url, None).await
    }

    async fn find_security_group(&self, name_or_id: &str) -> Result<Option<SecurityGroup>> {
        self.find_neutron("security-groups", "security_groups", "security_group", name_or_id)
            .await
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        self.neutron_create(
            "security-groups",
            "security_group",
            json!({ "name": name, "description": description }),
        )
        .await
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        self.neutron_delete("security-groups", security_group_id).await
    }

    async fn create_security_group_rule(
        &self,
        request: &CreateSecurityGroupRuleRequest,
    ) -> Result<SecurityGroupRule> {
        self.neutron_create(
            "security-group-rules",
            "security_group_rule",
            Self::to_value(request)?,
        )
        .await
    }
}
