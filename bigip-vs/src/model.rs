//! Virtual server data model.
//!
//! [`DesiredState`] is the normalized, validated form of what the caller
//! declared. Every attribute is optional: `None` means "leave untouched",
//! `Some` of an empty value means "explicitly clear". [`ObservedState`] is
//! what the device currently holds. All names are fully qualified
//! (`/Partition/name`) in both.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Requested lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Exists; administrative state untouched.
    #[default]
    Present,
    /// Does not exist.
    Absent,
    /// Exists and is administratively enabled.
    Enabled,
    /// Exists and is administratively disabled.
    Disabled,
}

impl State {
    pub fn wants_resource(self) -> bool {
        !matches!(self, State::Absent)
    }

    /// Desired administrative state, if the state pins one.
    pub fn admin_enabled(self) -> Option<bool> {
        match self {
            State::Enabled => Some(true),
            State::Disabled => Some(false),
            State::Present | State::Absent => None,
        }
    }
}

/// Partition-qualified resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullName {
    pub partition: String,
    pub name: String,
}

impl FullName {
    pub fn new(partition: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            name: name.into(),
        }
    }

    /// Split a `/Partition/name` path. Names without a leading slash are
    /// placed in `default_partition`.
    pub fn parse(path: &str, default_partition: &str) -> Self {
        match path.strip_prefix('/').and_then(|p| p.split_once('/')) {
            Some((partition, name)) => Self::new(partition, name),
            None => Self::new(default_partition, path.trim_start_matches('/')),
        }
    }

    /// Path segment used by iControl REST URIs (`~Common~vs1`).
    pub fn uri_name(&self) -> String {
        format!("~{}~{}", self.partition, self.name.replace('/', "~"))
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.partition, self.name)
    }
}

/// Qualify `name` with `partition` unless it already is a full path.
pub fn qualify(partition: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}/{}", partition, name)
    }
}

/// Side of the connection a profile applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileContext {
    #[default]
    All,
    #[serde(rename = "clientside")]
    ClientSide,
    #[serde(rename = "serverside")]
    ServerSide,
}

impl ProfileContext {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileContext::All => "all",
            ProfileContext::ClientSide => "clientside",
            ProfileContext::ServerSide => "serverside",
        }
    }

    /// Accepts the device spelling and the hyphenated one (`client-side`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace('-', "").as_str() {
            "all" => Some(ProfileContext::All),
            "clientside" => Some(ProfileContext::ClientSide),
            "serverside" => Some(ProfileContext::ServerSide),
            _ => None,
        }
    }
}

/// A profile attached to a virtual server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Profile {
    pub name: String,
    pub context: ProfileContext,
}

impl Profile {
    pub fn new(name: impl Into<String>, context: ProfileContext) -> Self {
        Self {
            name: name.into(),
            context,
        }
    }
}

/// Source address translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snat {
    None,
    Automap,
    /// SNAT pool, fully qualified.
    Pool(String),
}

impl fmt::Display for Snat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snat::None => f.write_str("none"),
            Snat::Automap => f.write_str("automap"),
            Snat::Pool(pool) => f.write_str(pool),
        }
    }
}

impl Serialize for Snat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// VLANs a virtual server listens on.
///
/// `All` is its own state, distinct from any explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vlans {
    All,
    Explicit(BTreeSet<String>),
}

impl Serialize for Vlans {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Vlans::All => serializer.serialize_str("ALL"),
            Vlans::Explicit(names) => serializer.collect_seq(names),
        }
    }
}

/// Listening address and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// IP address, optionally with a `%` route domain suffix.
    pub address: String,
    /// 0 means any port.
    pub port: u16,
}

impl Destination {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    fn is_ipv6(&self) -> bool {
        self.address.contains(':')
    }

    /// Device form: `/Common/10.0.0.1:80`, `/Common/2001:db8::1.80`.
    pub fn to_device(&self, partition: &str) -> String {
        let sep = if self.is_ipv6() { '.' } else { ':' };
        format!("/{}/{}{}{}", partition, self.address, sep, self.port)
    }

    /// Parse the device form. The partition prefix is optional.
    pub fn from_device(value: &str) -> Option<Self> {
        let bare = value.rsplit('/').next().unwrap_or(value);
        let (address, port) = if bare.matches(':').count() > 1 {
            bare.rsplit_once('.')?
        } else {
            bare.rsplit_once(':')?
        };
        let port = port.parse().ok()?;
        Some(Self::new(address, port))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validated desired state of one virtual server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesiredState {
    pub name: String,
    pub partition: String,
    pub state: State,
    pub description: Option<String>,
    /// Address only; the port lives in `port`.
    pub destination: Option<String>,
    pub port: Option<u16>,
    /// Full replacement set.
    pub profiles: Option<Vec<Profile>>,
    /// Added to `profiles` at creation only.
    pub all_profiles: Option<Vec<Profile>>,
    pub snat: Option<Snat>,
    pub enabled_vlans: Option<Vlans>,
    /// Empty means remove all.
    pub policies: Option<Vec<String>>,
    /// Empty string means remove the default pool.
    pub pool: Option<String>,
    /// Ordered; empty means remove all.
    pub irules: Option<Vec<String>>,
}

impl DesiredState {
    /// Minimal state naming a resource, with nothing else supplied.
    pub fn named(partition: impl Into<String>, name: impl Into<String>, state: State) -> Self {
        Self {
            name: name.into(),
            partition: partition.into(),
            state,
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> FullName {
        FullName::new(&self.partition, &self.name)
    }
}

/// State of a virtual server as read from the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedState {
    pub name: String,
    pub partition: String,
    pub description: Option<String>,
    pub destination: Option<Destination>,
    pub profiles: Vec<Profile>,
    pub snat: Snat,
    pub enabled_vlans: Vlans,
    pub policies: Vec<String>,
    pub pool: Option<String>,
    pub irules: Vec<String>,
    pub enabled: bool,
}

impl ObservedState {
    /// A freshly created virtual server with no attributes set.
    pub fn empty(name: &FullName) -> Self {
        Self {
            name: name.name.clone(),
            partition: name.partition.clone(),
            description: None,
            destination: None,
            profiles: Vec::new(),
            snat: Snat::None,
            enabled_vlans: Vlans::All,
            policies: Vec::new(),
            pool: None,
            irules: Vec::new(),
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_parse() {
        assert_eq!(FullName::parse("vs1", "Common"), FullName::new("Common", "vs1"));
        assert_eq!(
            FullName::parse("/Tenant/vs1", "Common"),
            FullName::new("Tenant", "vs1")
        );
        assert_eq!(
            FullName::parse("/Tenant/app/vs1", "Common"),
            FullName::new("Tenant", "app/vs1")
        );
    }

    #[test]
    fn test_uri_name() {
        assert_eq!(FullName::new("Common", "vs1").uri_name(), "~Common~vs1");
        assert_eq!(FullName::new("T", "app/vs1").uri_name(), "~T~app~vs1");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("Common", "http"), "/Common/http");
        assert_eq!(qualify("Common", "/Other/http"), "/Other/http");
    }

    #[test]
    fn test_destination_device_form() {
        assert_eq!(
            Destination::new("10.0.0.1", 80).to_device("Common"),
            "/Common/10.0.0.1:80"
        );
        assert_eq!(
            Destination::new("2001:db8::1", 443).to_device("Common"),
            "/Common/2001:db8::1.443"
        );
        assert_eq!(
            Destination::new("10.0.0.1%2", 8080).to_device("Common"),
            "/Common/10.0.0.1%2:8080"
        );
    }

    #[test]
    fn test_destination_from_device() {
        assert_eq!(
            Destination::from_device("/Common/10.0.0.1:80"),
            Some(Destination::new("10.0.0.1", 80))
        );
        assert_eq!(
            Destination::from_device("/Common/2001:db8::1.443"),
            Some(Destination::new("2001:db8::1", 443))
        );
        assert_eq!(
            Destination::from_device("/Common/10.1.1.1%3:0"),
            Some(Destination::new("10.1.1.1%3", 0))
        );
        assert_eq!(Destination::from_device("/Common/garbage"), None);
    }

    #[test]
    fn test_profile_context_parse() {
        assert_eq!(ProfileContext::parse("all"), Some(ProfileContext::All));
        assert_eq!(
            ProfileContext::parse("client-side"),
            Some(ProfileContext::ClientSide)
        );
        assert_eq!(
            ProfileContext::parse("serverside"),
            Some(ProfileContext::ServerSide)
        );
        assert_eq!(ProfileContext::parse("both"), None);
    }

    #[test]
    fn test_vlans_serialize() {
        assert_eq!(serde_json::to_string(&Vlans::All).unwrap(), "\"ALL\"");
        let explicit = Vlans::Explicit(["/Common/a".to_string()].into_iter().collect());
        assert_eq!(serde_json::to_string(&explicit).unwrap(), "[\"/Common/a\"]");
    }

    #[test]
    fn test_state_admin_enabled() {
        assert_eq!(State::Present.admin_enabled(), None);
        assert_eq!(State::Disabled.admin_enabled(), Some(false));
        assert!(!State::Absent.wants_resource());
    }
}
