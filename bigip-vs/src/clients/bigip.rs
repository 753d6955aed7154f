//! iControl REST client for BIG-IP LTM virtual servers.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::DeviceApi;
use crate::config::ConnectionConfig;
use crate::diff::Changes;
use crate::error::{Error, Result};
use crate::model::{
    qualify, Destination, FullName, ObservedState, Profile, ProfileContext, Snat, Vlans,
};

const VIRTUAL_PATH: &str = "/mgmt/tm/ltm/virtual";
const LOGIN_PATH: &str = "/mgmt/shared/authn/login";
const TOKEN_PATH: &str = "/mgmt/shared/authz/tokens";
const TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Client for the BIG-IP management REST API.
///
/// Authenticates with a token obtained from the login endpoint on first use.
/// A token rejected by the device is refreshed once per request.
pub struct BigIpClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
    auth_provider: String,
    timeout: Duration,
    token: Mutex<Option<String>>,
}

impl BigIpClient {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.validate_certs)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            auth_provider: config.auth_provider.clone(),
            timeout: config.timeout,
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Release the auth token on the device, if one was obtained.
    pub async fn logout(&self) -> Result<()> {
        let token = self.token.lock().await.take();
        if let Some(token) = token {
            let url = format!("{}{}/{}", self.base_url, TOKEN_PATH, token);
            let resp = self
                .http
                .delete(&url)
                .header(TOKEN_HEADER, &token)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            check_status(resp).await?;
            debug!("Released auth token on {}", self.base_url);
        }
        Ok(())
    }

    async fn login(&self) -> Result<String> {
        debug!("Logging in to {} as {}", self.base_url, self.user);
        let body = LoginRequest {
            username: &self.user,
            password: &self.password,
            login_provider_name: &self.auth_provider,
        };
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = check_status(resp).await?;
        let login: LoginResponse = resp.json().await.map_err(|e| self.transport_error(e))?;
        Ok(login.token.token)
    }

    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let mut refreshed = false;
        loop {
            let token = self.token().await?;
            let mut req = self
                .http
                .request(method.clone(), url)
                .header(TOKEN_HEADER, &token);
            if let Some(body) = body {
                req = req.json(body);
            }
            let resp = req.send().await.map_err(|e| self.transport_error(e))?;

            if resp.status() == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("Auth token rejected by {}, logging in again", self.base_url);
                *self.token.lock().await = None;
                refreshed = true;
                continue;
            }
            return check_status(resp).await;
        }
    }

    fn resource_url(&self, name: &FullName) -> String {
        format!("{}{}/{}", self.base_url, VIRTUAL_PATH, name.uri_name())
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else if e.is_decode() {
            Error::Device {
                status: 0,
                message: format!("invalid response body: {}", e),
            }
        } else {
            Error::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl DeviceApi for BigIpClient {
    async fn fetch(&self, name: &FullName) -> Result<Option<ObservedState>> {
        let url = format!("{}?expandSubcollections=true", self.resource_url(name));
        let resp = match self.send(Method::GET, &url, None).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                debug!("Virtual server {} does not exist", name);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let resource: VirtualResource = resp.json().await.map_err(|e| self.transport_error(e))?;
        Ok(Some(resource.into_observed(&name.partition)))
    }

    async fn create(&self, name: &FullName, changes: &Changes) -> Result<()> {
        info!("Creating virtual server {}", name);
        let mut payload = VirtualPayload::from_changes(&name.partition, changes);
        payload.name = Some(name.name.clone());
        payload.partition = Some(name.partition.clone());
        let body = to_json(&payload)?;
        let url = format!("{}{}", self.base_url, VIRTUAL_PATH);
        self.send(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }

    async fn update(&self, name: &FullName, changes: &Changes) -> Result<()> {
        info!(
            "Updating virtual server {}: {}",
            name,
            changes.attributes().join(", ")
        );
        let payload = VirtualPayload::from_changes(&name.partition, changes);
        let body = to_json(&payload)?;
        self.send(Method::PATCH, &self.resource_url(name), Some(&body))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &FullName) -> Result<()> {
        info!("Deleting virtual server {}", name);
        self.send(Method::DELETE, &self.resource_url(name), None)
            .await?;
        Ok(())
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<DeviceErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Device {
            status: status.as_u16(),
            message,
        },
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Device {
        status: 0,
        message: format!("failed to encode request: {}", e),
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    login_provider_name: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Deserialize)]
struct DeviceErrorBody {
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnatWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceItem {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition: Option<String>,
    #[serde(default, skip_serializing)]
    full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl ReferenceItem {
    fn from_path(path: &str, partition: &str, context: Option<ProfileContext>) -> Self {
        let full = FullName::parse(path, partition);
        Self {
            name: full.name,
            partition: Some(full.partition),
            full_path: None,
            context: context.map(|c| c.as_str().to_string()),
        }
    }

    fn path(&self, partition: &str) -> String {
        match &self.full_path {
            Some(path) => path.clone(),
            None => qualify(self.partition.as_deref().unwrap_or(partition), &self.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemsReference {
    #[serde(default)]
    items: Vec<ReferenceItem>,
}

/// Virtual server as returned by `GET ...?expandSubcollections=true`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualResource {
    name: String,
    #[serde(default)]
    partition: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    pool: Option<String>,
    #[serde(default)]
    rules: Vec<String>,
    #[serde(default)]
    source_address_translation: Option<SnatWire>,
    #[serde(default)]
    vlans_enabled: bool,
    #[serde(default)]
    vlans: Vec<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    profiles_reference: Option<ItemsReference>,
    #[serde(default)]
    policies_reference: Option<ItemsReference>,
}

impl VirtualResource {
    fn into_observed(self, fallback_partition: &str) -> ObservedState {
        let partition = self
            .partition
            .unwrap_or_else(|| fallback_partition.to_string());

        let profiles = self
            .profiles_reference
            .map(|r| r.items)
            .unwrap_or_default()
            .iter()
            .map(|item| {
                let context = item
                    .context
                    .as_deref()
                    .and_then(ProfileContext::parse)
                    .unwrap_or_default();
                Profile::new(item.path(&partition), context)
            })
            .collect();

        let policies = self
            .policies_reference
            .map(|r| r.items)
            .unwrap_or_default()
            .iter()
            .map(|item| item.path(&partition))
            .collect();

        let snat = match self.source_address_translation {
            Some(SnatWire { kind, pool }) => match kind.as_str() {
                "automap" => Snat::Automap,
                "snat" => match pool {
                    Some(pool) if !pool.is_empty() => Snat::Pool(qualify(&partition, &pool)),
                    _ => Snat::None,
                },
                _ => Snat::None,
            },
            None => Snat::None,
        };

        // Disabled-on-list VLAN configuration is not managed; it reads as All.
        let enabled_vlans = if self.vlans_enabled {
            Vlans::Explicit(
                self.vlans
                    .iter()
                    .map(|v| qualify(&partition, v))
                    .collect::<BTreeSet<_>>(),
            )
        } else {
            Vlans::All
        };

        ObservedState {
            name: self.name,
            description: self.description,
            destination: self.destination.as_deref().and_then(Destination::from_device),
            profiles,
            snat,
            enabled_vlans,
            policies,
            pool: self
                .pool
                .filter(|p| !p.is_empty() && p != "none")
                .map(|p| qualify(&partition, &p)),
            irules: self.rules.iter().map(|r| qualify(&partition, r)).collect(),
            enabled: !self.disabled,
            partition,
        }
    }
}

/// Body of create (POST) and update (PATCH) requests.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct VirtualPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_address_translation: Option<SnatWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vlans_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vlans_disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vlans: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profiles: Option<Vec<ReferenceItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policies: Option<Vec<ReferenceItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disabled: Option<bool>,
}

impl VirtualPayload {
    fn from_changes(partition: &str, changes: &Changes) -> Self {
        let mut payload = VirtualPayload {
            description: changes.description.clone(),
            destination: changes.destination.as_ref().map(|d| d.to_device(partition)),
            pool: changes.pool.clone(),
            rules: changes.irules.clone(),
            ..Default::default()
        };

        payload.source_address_translation = changes.snat.as_ref().map(|snat| match snat {
            Snat::None => SnatWire {
                kind: "none".into(),
                pool: None,
            },
            Snat::Automap => SnatWire {
                kind: "automap".into(),
                pool: None,
            },
            Snat::Pool(pool) => SnatWire {
                kind: "snat".into(),
                pool: Some(pool.clone()),
            },
        });

        match &changes.enabled_vlans {
            Some(Vlans::All) => {
                payload.vlans_disabled = Some(true);
                payload.vlans = Some(Vec::new());
            }
            Some(Vlans::Explicit(names)) => {
                payload.vlans_enabled = Some(true);
                payload.vlans = Some(names.iter().cloned().collect());
            }
            None => {}
        }

        payload.profiles = changes.profiles.as_ref().map(|profiles| {
            profiles
                .iter()
                .map(|p| ReferenceItem::from_path(&p.name, partition, Some(p.context)))
                .collect()
        });
        payload.policies = changes.policies.as_ref().map(|policies| {
            policies
                .iter()
                .map(|p| ReferenceItem::from_path(p, partition, None))
                .collect()
        });

        match changes.enabled {
            Some(true) => payload.enabled = Some(true),
            Some(false) => payload.disabled = Some(true),
            None => {}
        }

        payload
    }
}
