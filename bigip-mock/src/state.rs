//! Device state held by the mock: accounts, tokens and virtual servers.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Profiles present on a factory-default device.
pub const BUILTIN_PROFILES: &[&str] = &[
    "/Common/tcp",
    "/Common/udp",
    "/Common/fastL4",
    "/Common/http",
    "/Common/http2",
    "/Common/clientssl",
    "/Common/serverssl",
    "/Common/oneconnect",
    "/Common/websocket",
    "/Common/tcp-lan-optimized",
    "/Common/tcp-wan-optimized",
];

/// Profile attached to a virtual server created without any.
const DEFAULT_PROFILE: &str = "/Common/tcp";

/// Prefix `name` with `/partition/` unless it is already a full path.
pub fn qualify(partition: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}/{}", partition, name)
    }
}

/// `~Common~vs1` to `/Common/vs1`.
pub fn path_from_uri(uri_name: &str) -> String {
    let path = uri_name.replace('~', "/");
    if path.starts_with('/') {
        path
    } else {
        format!("/Common/{}", path)
    }
}

fn split_path(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((partition, name)) => (partition.to_string(), name.to_string()),
        None => ("Common".to_string(), trimmed.to_string()),
    }
}

/// Profile or policy attached to a virtual server.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub full_path: String,
    pub context: Option<String>,
}

impl Reference {
    fn render(&self) -> Value {
        let (partition, name) = split_path(&self.full_path);
        let mut item = json!({
            "kind": "tm:ltm:virtual:profiles:profilesstate",
            "name": name,
            "partition": partition,
            "fullPath": self.full_path,
        });
        if let Some(context) = &self.context {
            item["context"] = json!(context);
        }
        item
    }
}

/// A reference as sent by clients: a bare name or an object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ReferenceInput {
    Name(String),
    Item {
        name: String,
        #[serde(default)]
        partition: Option<String>,
        #[serde(default)]
        context: Option<String>,
    },
}

impl ReferenceInput {
    fn resolve(&self, partition: &str) -> (String, Option<String>) {
        match self {
            ReferenceInput::Name(name) => (qualify(partition, name), None),
            ReferenceInput::Item {
                name,
                partition: item_partition,
                context,
            } => (
                qualify(item_partition.as_deref().unwrap_or(partition), name),
                context.clone(),
            ),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SnatInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub pool: Option<String>,
}

/// Body of a create or modify request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<String>>,
    #[serde(default)]
    pub source_address_translation: Option<SnatInput>,
    #[serde(default)]
    pub vlans_enabled: Option<bool>,
    #[serde(default)]
    pub vlans_disabled: Option<bool>,
    #[serde(default)]
    pub vlans: Option<Vec<String>>,
    #[serde(default)]
    pub profiles: Option<Vec<ReferenceInput>>,
    #[serde(default)]
    pub policies: Option<Vec<ReferenceInput>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// Stored virtual server.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualServer {
    pub partition: String,
    pub name: String,
    pub description: Option<String>,
    pub destination: String,
    pub pool: Option<String>,
    pub rules: Vec<String>,
    pub snat_type: String,
    pub snat_pool: Option<String>,
    pub vlans_enabled: bool,
    pub vlans: Vec<String>,
    pub profiles: Vec<Reference>,
    pub policies: Vec<Reference>,
    pub disabled: bool,
    pub generation: u64,
}

impl VirtualServer {
    fn new(partition: &str, name: &str, destination: String) -> Self {
        Self {
            partition: partition.to_string(),
            name: name.to_string(),
            description: None,
            destination,
            pool: None,
            rules: Vec::new(),
            snat_type: "none".to_string(),
            snat_pool: None,
            vlans_enabled: false,
            vlans: Vec::new(),
            profiles: Vec::new(),
            policies: Vec::new(),
            disabled: false,
            generation: 1,
        }
    }

    pub fn full_path(&self) -> String {
        format!("/{}/{}", self.partition, self.name)
    }

    /// Merge `payload` into this record. Absent fields are left untouched.
    pub fn apply(
        &mut self,
        payload: &VirtualPayload,
        known_profiles: &HashSet<String>,
    ) -> Result<(), ApiError> {
        let partition = self.partition.clone();

        let profiles = match &payload.profiles {
            Some(inputs) => {
                let mut profiles = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let (full_path, context) = input.resolve(&partition);
                    if !known_profiles.contains(&full_path) {
                        return Err(ApiError::bad_request(format!(
                            "01020036:3: The requested profile ({}) was not found.",
                            full_path
                        )));
                    }
                    profiles.push(Reference {
                        full_path,
                        context: Some(context.unwrap_or_else(|| "all".to_string())),
                    });
                }
                Some(profiles)
            }
            None => None,
        };

        let snat = match &payload.source_address_translation {
            Some(SnatInput { kind, pool }) => match (kind.as_str(), pool.as_deref()) {
                ("none" | "automap", _) => Some((kind.clone(), None)),
                ("snat", Some(pool)) if !pool.is_empty() => {
                    Some((kind.clone(), Some(qualify(&partition, pool))))
                }
                ("snat", _) => {
                    return Err(ApiError::bad_request(
                        "01070734:3: Configuration error: a SNAT pool is required",
                    ));
                }
                (other, _) => {
                    return Err(ApiError::bad_request(format!(
                        "invalid source address translation type: {}",
                        other
                    )));
                }
            },
            None => None,
        };

        if let Some(description) = &payload.description {
            self.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(destination) = &payload.destination {
            self.destination = qualify(&partition, destination);
        }
        if let Some(pool) = &payload.pool {
            self.pool = match pool.as_str() {
                "" | "none" => None,
                pool => Some(qualify(&partition, pool)),
            };
        }
        if let Some(rules) = &payload.rules {
            self.rules = rules.iter().map(|r| qualify(&partition, r)).collect();
        }
        if let Some((kind, pool)) = snat {
            self.snat_type = kind;
            self.snat_pool = pool;
        }
        if payload.vlans_enabled == Some(true) {
            self.vlans_enabled = true;
        }
        if payload.vlans_disabled == Some(true) {
            self.vlans_enabled = false;
        }
        if let Some(vlans) = &payload.vlans {
            self.vlans = vlans.iter().map(|v| qualify(&partition, v)).collect();
        }
        if let Some(profiles) = profiles {
            self.profiles = profiles;
        }
        if let Some(policies) = &payload.policies {
            self.policies = policies
                .iter()
                .map(|p| Reference {
                    full_path: p.resolve(&partition).0,
                    context: None,
                })
                .collect();
        }
        if payload.enabled == Some(true) {
            self.disabled = false;
        }
        if payload.disabled == Some(true) {
            self.disabled = true;
        }
        Ok(())
    }

    /// JSON as returned by `GET /mgmt/tm/ltm/virtual/~P~name`.
    pub fn render(&self, expand: bool) -> Value {
        let uri_name = self.full_path().replace('/', "~");
        let self_link = format!("https://localhost/mgmt/tm/ltm/virtual/{}", uri_name);

        let mut body = Map::new();
        body.insert("kind".into(), json!("tm:ltm:virtual:virtualstate"));
        body.insert("name".into(), json!(self.name));
        body.insert("partition".into(), json!(self.partition));
        body.insert("fullPath".into(), json!(self.full_path()));
        body.insert("generation".into(), json!(self.generation));
        body.insert("selfLink".into(), json!(self_link));
        body.insert("destination".into(), json!(self.destination));
        body.insert("source".into(), json!("0.0.0.0/0"));
        body.insert("ipProtocol".into(), json!("tcp"));

        let mut snat = json!({ "type": self.snat_type });
        if let Some(pool) = &self.snat_pool {
            snat["pool"] = json!(pool);
        }
        body.insert("sourceAddressTranslation".into(), snat);

        if let Some(description) = &self.description {
            body.insert("description".into(), json!(description));
        }
        if let Some(pool) = &self.pool {
            body.insert("pool".into(), json!(pool));
        }
        if !self.rules.is_empty() {
            body.insert("rules".into(), json!(self.rules));
        }

        if self.vlans_enabled {
            body.insert("vlansEnabled".into(), json!(true));
        } else {
            body.insert("vlansDisabled".into(), json!(true));
        }
        if !self.vlans.is_empty() {
            body.insert("vlans".into(), json!(self.vlans));
        }

        if self.disabled {
            body.insert("disabled".into(), json!(true));
        } else {
            body.insert("enabled".into(), json!(true));
        }

        body.insert(
            "profilesReference".into(),
            subcollection(&self_link, "profiles", &self.profiles, expand),
        );
        body.insert(
            "policiesReference".into(),
            subcollection(&self_link, "policies", &self.policies, expand),
        );
        Value::Object(body)
    }
}

fn subcollection(self_link: &str, kind: &str, items: &[Reference], expand: bool) -> Value {
    let mut reference = json!({
        "link": format!("{}/{}", self_link, kind),
        "isSubcollection": true,
    });
    if expand && !items.is_empty() {
        reference["items"] = Value::Array(items.iter().map(Reference::render).collect());
    }
    reference
}

pub struct AppStateInner {
    pub user: String,
    pub password: String,
    pub tokens: HashSet<String>,
    pub profiles: HashSet<String>,
    pub virtuals: HashMap<String, VirtualServer>,
    /// Successful create, modify and delete requests.
    pub writes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
}

impl AppState {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        let state = AppStateInner {
            user: user.into(),
            password: password.into(),
            tokens: HashSet::new(),
            profiles: BUILTIN_PROFILES.iter().map(|p| p.to_string()).collect(),
            virtuals: HashMap::new(),
            writes: 0,
        };
        AppState {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Register an extra profile.
    pub async fn add_profile(&self, full_path: impl Into<String>) {
        self.inner.write().await.profiles.insert(full_path.into());
    }

    pub async fn virtual_server(&self, full_path: &str) -> Option<VirtualServer> {
        self.inner.read().await.virtuals.get(full_path).cloned()
    }

    pub async fn writes(&self) -> usize {
        self.inner.read().await.writes
    }

    pub async fn active_tokens(&self) -> usize {
        self.inner.read().await.tokens.len()
    }
}

impl AppStateInner {
    /// Build a new virtual server from a create request.
    pub fn create_virtual(&mut self, payload: &VirtualPayload) -> Result<VirtualServer, ApiError> {
        let name = payload
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::bad_request("name is required"))?;
        let default_partition = payload.partition.as_deref().unwrap_or("Common");
        let (partition, name) = split_path(&qualify(default_partition, name));

        let full_path = format!("/{}/{}", partition, name);
        if self.virtuals.contains_key(&full_path) {
            return Err(ApiError::conflict(format!(
                "01020066:3: The requested Virtual Server ({}) already exists in partition {}.",
                full_path, partition
            )));
        }
        let destination = payload
            .destination
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("01070734:3: Configuration error: destination is required"))?;

        let mut vs = VirtualServer::new(&partition, &name, qualify(&partition, destination));
        vs.apply(payload, &self.profiles)?;
        if vs.profiles.is_empty() {
            vs.profiles.push(Reference {
                full_path: DEFAULT_PROFILE.to_string(),
                context: Some("all".to_string()),
            });
        }
        self.virtuals.insert(full_path, vs.clone());
        self.writes += 1;
        Ok(vs)
    }

    pub fn modify_virtual(
        &mut self,
        full_path: &str,
        payload: &VirtualPayload,
    ) -> Result<VirtualServer, ApiError> {
        let profiles = &self.profiles;
        let vs = self
            .virtuals
            .get_mut(full_path)
            .ok_or_else(|| virtual_not_found(full_path))?;
        let mut updated = vs.clone();
        updated.apply(payload, profiles)?;
        updated.generation += 1;
        *vs = updated.clone();
        self.writes += 1;
        Ok(updated)
    }

    pub fn delete_virtual(&mut self, full_path: &str) -> Result<(), ApiError> {
        self.virtuals
            .remove(full_path)
            .ok_or_else(|| virtual_not_found(full_path))?;
        self.writes += 1;
        Ok(())
    }
}

pub fn virtual_not_found(full_path: &str) -> ApiError {
    ApiError::not_found(format!(
        "01020036:3: The requested Virtual Server ({}) was not found.",
        full_path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: Value) -> VirtualPayload {
        serde_json::from_value(value).unwrap()
    }

    fn inner() -> AppStateInner {
        AppStateInner {
            user: "admin".into(),
            password: "secret".into(),
            tokens: HashSet::new(),
            profiles: BUILTIN_PROFILES.iter().map(|p| p.to_string()).collect(),
            virtuals: HashMap::new(),
            writes: 0,
        }
    }

    #[test]
    fn test_path_from_uri() {
        assert_eq!(path_from_uri("~Common~vs1"), "/Common/vs1");
        assert_eq!(path_from_uri("vs1"), "/Common/vs1");
    }

    #[test]
    fn test_create_defaults_tcp_profile() {
        let mut state = inner();
        let vs = state
            .create_virtual(&payload(json!({
                "name": "vs1",
                "partition": "Common",
                "destination": "/Common/10.0.0.1:80"
            })))
            .unwrap();
        assert_eq!(vs.profiles[0].full_path, "/Common/tcp");
        assert_eq!(vs.snat_type, "none");
        assert!(!vs.disabled);
        assert_eq!(state.writes, 1);
    }

    #[test]
    fn test_create_duplicate_conflicts() {
        let mut state = inner();
        let body = payload(json!({ "name": "vs1", "destination": "10.0.0.1:80" }));
        state.create_virtual(&body).unwrap();
        let err = state.create_virtual(&body).unwrap_err();
        assert_eq!(err.code, 409);
    }

    #[test]
    fn test_unknown_profile_rejected_without_change() {
        let mut state = inner();
        state
            .create_virtual(&payload(json!({ "name": "vs1", "destination": "10.0.0.1:80" })))
            .unwrap();

        let err = state
            .modify_virtual(
                "/Common/vs1",
                &payload(json!({ "description": "x", "profiles": [{ "name": "nope" }] })),
            )
            .unwrap_err();
        assert_eq!(err.code, 400);
        assert!(err.message.contains("/Common/nope"));
        assert_eq!(state.virtuals["/Common/vs1"].description, None);
    }

    #[test]
    fn test_modify_merges() {
        let mut state = inner();
        state
            .create_virtual(&payload(json!({
                "name": "vs1",
                "destination": "/Common/10.0.0.1:80",
                "sourceAddressTranslation": { "type": "automap" },
                "pool": "/Common/web"
            })))
            .unwrap();

        let vs = state
            .modify_virtual(
                "/Common/vs1",
                &payload(json!({ "destination": "/Common/10.0.0.1:8080", "pool": "" })),
            )
            .unwrap();
        assert_eq!(vs.destination, "/Common/10.0.0.1:8080");
        assert_eq!(vs.snat_type, "automap");
        assert_eq!(vs.pool, None);
        assert_eq!(vs.generation, 2);
    }

    #[test]
    fn test_render_vlans_and_subcollections() {
        let mut vs = VirtualServer::new("Common", "vs1", "/Common/10.0.0.1:80".into());
        vs.vlans_enabled = true;
        vs.vlans = vec!["/Common/net1".into()];
        vs.policies.push(Reference {
            full_path: "/Common/pol1".into(),
            context: None,
        });

        let body = vs.render(true);
        assert_eq!(body["vlansEnabled"], true);
        assert_eq!(body["vlans"], json!(["/Common/net1"]));
        assert_eq!(body["enabled"], true);
        assert_eq!(body["policiesReference"]["items"][0]["fullPath"], "/Common/pol1");
        assert!(body["profilesReference"].get("items").is_none());

        let body = vs.render(false);
        assert!(body["policiesReference"].get("items").is_none());
    }
}
