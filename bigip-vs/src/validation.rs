//! Declared input and its validation into a [`DesiredState`].

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;

use serde::Deserialize;

use crate::config::DEFAULT_PARTITION;
use crate::error::ValidationError;
use crate::model::{qualify, DesiredState, FullName, Profile, ProfileContext, Snat, State, Vlans};

pub type Result<T> = std::result::Result<T, ValidationError>;

/// A scalar or a list of scalars. A single empty string means "empty list".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) if s.trim().is_empty() => Vec::new(),
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v.into_iter().filter(|s| !s.trim().is_empty()).collect(),
        }
    }
}

/// A profile given by name, or by name and context.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProfileParam {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        context: Option<String>,
    },
}

/// Declared parameters for one virtual server, as read from a task file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualServerParams {
    pub name: String,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub state: Option<State>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub profiles: Option<Vec<ProfileParam>>,
    #[serde(default)]
    pub all_profiles: Option<Vec<ProfileParam>>,
    #[serde(default)]
    pub snat: Option<String>,
    #[serde(default)]
    pub enabled_vlans: Option<StringOrList>,
    #[serde(default)]
    pub policies: Option<StringOrList>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub irules: Option<StringOrList>,
}

/// A task file holds one declaration or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Many(Vec<VirtualServerParams>),
    One(VirtualServerParams),
}

/// Parse a YAML (or JSON) task file.
pub fn parse_tasks(text: &str) -> serde_yaml::Result<Vec<VirtualServerParams>> {
    Ok(match serde_yaml::from_str(text)? {
        TaskFile::Many(tasks) => tasks,
        TaskFile::One(task) => vec![task],
    })
}

/// Validate and normalize declared parameters.
pub fn validate(params: VirtualServerParams) -> Result<DesiredState> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }

    let partition = params
        .partition
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PARTITION);
    if partition.contains('/') || partition.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidPartition(partition.to_string()));
    }

    // A fully qualified name overrides the partition parameter.
    let full = FullName::parse(name, partition);
    if full.name.is_empty() || full.name.contains(char::is_whitespace) || full.name.contains('~')
    {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    let partition = full.partition.clone();

    let (destination, port) = match params.destination.as_deref() {
        Some(dest) => {
            let (address, embedded) = parse_destination(dest)?;
            let port = match (embedded, params.port) {
                (Some(d), Some(p)) if d != p => {
                    return Err(ValidationError::PortConflict {
                        destination: d,
                        port: p,
                    });
                }
                (d, p) => p.or(d),
            };
            (Some(address), port)
        }
        None => (None, params.port),
    };

    let profiles = params
        .profiles
        .map(|p| profile_list(&partition, p))
        .transpose()?;
    let all_profiles = params
        .all_profiles
        .map(|p| profile_list(&partition, p))
        .transpose()?;

    let snat = params.snat.map(|s| parse_snat(&partition, &s));
    let enabled_vlans = params
        .enabled_vlans
        .map(|v| parse_vlans(&partition, v))
        .transpose()?;
    let policies = params.policies.map(|p| name_list(&partition, p));
    let irules = params.irules.map(|r| name_list(&partition, r));

    let pool = params.pool.map(|p| {
        let p = p.trim();
        if p.is_empty() || p.eq_ignore_ascii_case("none") {
            String::new()
        } else {
            qualify(&partition, p)
        }
    });

    Ok(DesiredState {
        name: full.name,
        partition,
        state: params.state.unwrap_or_default(),
        description: params.description,
        destination,
        port,
        profiles,
        all_profiles,
        snat,
        enabled_vlans,
        policies,
        pool,
        irules,
    })
}

/// Split a destination into canonical address and optional embedded port.
///
/// Accepted forms: `10.0.0.1`, `10.0.0.1%2`, `10.0.0.1:80`,
/// `2001:db8::1`, `[2001:db8::1]:80`.
fn parse_destination(value: &str) -> Result<(String, Option<u16>)> {
    let value = value.trim();
    let invalid = || ValidationError::InvalidDestination(value.to_string());

    if let Some(rest) = value.strip_prefix('[') {
        let (address, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let (_, address) = canonical_address(address).ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().map_err(|_| invalid())?),
            None if tail.is_empty() => None,
            None => return Err(invalid()),
        };
        return Ok((address, port));
    }

    if let Some((_, address)) = canonical_address(value) {
        return Ok((address, None));
    }

    // IPv4 with port
    let (address, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    match canonical_address(address) {
        Some((IpAddr::V4(_), address)) => {
            let port = port.parse().map_err(|_| invalid())?;
            Ok((address, Some(port)))
        }
        _ => Err(invalid()),
    }
}

/// Parse an address with an optional numeric `%` route domain. The text
/// form is canonical (`2001:DB8:0::1` becomes `2001:db8::1`).
fn canonical_address(value: &str) -> Option<(IpAddr, String)> {
    let (ip, route_domain) = match value.split_once('%') {
        Some((ip, rd)) => (ip, Some(rd)),
        None => (value, None),
    };
    let ip: IpAddr = ip.parse().ok()?;
    match route_domain {
        Some(rd) => {
            let rd: u16 = rd.parse().ok()?;
            Some((ip, format!("{}%{}", ip, rd)))
        }
        None => Some((ip, ip.to_string())),
    }
}

fn profile_list(partition: &str, params: Vec<ProfileParam>) -> Result<Vec<Profile>> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for param in params {
        let profile = match param {
            ProfileParam::Name(name) => {
                Profile::new(qualify(partition, name.trim()), ProfileContext::All)
            }
            ProfileParam::Detailed { name, context } => {
                let context = match context.as_deref() {
                    None => ProfileContext::All,
                    Some(c) => ProfileContext::parse(c)
                        .ok_or_else(|| ValidationError::InvalidProfileContext(c.to_string()))?,
                };
                Profile::new(qualify(partition, name.trim()), context)
            }
        };
        if seen.insert(profile.clone()) {
            result.push(profile);
        }
    }
    // The device always attaches at least one profile.
    if result.is_empty() {
        return Err(ValidationError::EmptyProfiles);
    }
    Ok(result)
}

fn parse_snat(partition: &str, value: &str) -> Snat {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Snat::None
    } else if value.eq_ignore_ascii_case("automap") {
        Snat::Automap
    } else {
        Snat::Pool(qualify(partition, value))
    }
}

fn parse_vlans(partition: &str, value: StringOrList) -> Result<Vlans> {
    let names = value.into_vec();
    let has_all = names.iter().any(|n| n.trim().eq_ignore_ascii_case("all"));
    if has_all {
        if names.len() > 1 {
            return Err(ValidationError::MixedVlans);
        }
        return Ok(Vlans::All);
    }
    Ok(Vlans::Explicit(
        names
            .iter()
            .map(|n| qualify(partition, n.trim()))
            .collect::<BTreeSet<_>>(),
    ))
}

fn name_list(partition: &str, value: StringOrList) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .into_vec()
        .iter()
        .map(|n| qualify(partition, n.trim()))
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str) -> VirtualServerParams {
        VirtualServerParams {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn from_yaml(yaml: &str) -> Result<DesiredState> {
        validate(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_defaults() {
        let desired = validate(params("vs1")).unwrap();
        assert_eq!(desired.partition, "Common");
        assert_eq!(desired.state, State::Present);
        assert!(desired.profiles.is_none());
        assert!(desired.policies.is_none());
    }

    #[test]
    fn test_name_required() {
        assert_eq!(validate(params("  ")), Err(ValidationError::NameRequired));
    }

    #[test]
    fn test_qualified_name_sets_partition() {
        let desired = validate(params("/Tenant/vs1")).unwrap();
        assert_eq!(desired.partition, "Tenant");
        assert_eq!(desired.name, "vs1");
    }

    #[test]
    fn test_invalid_name() {
        assert!(matches!(
            validate(params("my vs")),
            Err(ValidationError::InvalidName(_))
        ));
    }

    #[test]
    fn test_destination_forms() {
        assert_eq!(parse_destination("10.0.0.1").unwrap(), ("10.0.0.1".into(), None));
        assert_eq!(
            parse_destination("10.0.0.1:80").unwrap(),
            ("10.0.0.1".into(), Some(80))
        );
        assert_eq!(
            parse_destination("10.0.0.1%2").unwrap(),
            ("10.0.0.1%2".into(), None)
        );
        assert_eq!(
            parse_destination("2001:db8::1").unwrap(),
            ("2001:db8::1".into(), None)
        );
        assert_eq!(
            parse_destination("[2001:db8::1]:443").unwrap(),
            ("2001:db8::1".into(), Some(443))
        );
        assert_eq!(
            parse_destination("[2001:DB8:0::1]:443").unwrap(),
            ("2001:db8::1".into(), Some(443))
        );
        assert_eq!(
            parse_destination("2001:DB8:0:0::1%02").unwrap(),
            ("2001:db8::1%2".into(), None)
        );
        assert!(parse_destination("lb.example.com").is_err());
        assert!(parse_destination("10.0.0.1%x").is_err());
        assert!(parse_destination("10.0.0.1:http").is_err());
    }

    #[test]
    fn test_destination_port_merges() {
        let desired = from_yaml("name: vs1\ndestination: 10.0.0.1:80\n").unwrap();
        assert_eq!(desired.destination.as_deref(), Some("10.0.0.1"));
        assert_eq!(desired.port, Some(80));
    }

    #[test]
    fn test_destination_port_conflict() {
        let result = from_yaml("name: vs1\ndestination: 10.0.0.1:80\nport: 8080\n");
        assert_eq!(
            result,
            Err(ValidationError::PortConflict {
                destination: 80,
                port: 8080
            })
        );
    }

    #[test]
    fn test_snat_values() {
        assert_eq!(parse_snat("Common", "Automap"), Snat::Automap);
        assert_eq!(parse_snat("Common", "None"), Snat::None);
        assert_eq!(
            parse_snat("Common", "snatpool1"),
            Snat::Pool("/Common/snatpool1".into())
        );
    }

    #[test]
    fn test_vlans_all_sentinel() {
        let desired = from_yaml("name: vs1\nenabled_vlans: ALL\n").unwrap();
        assert_eq!(desired.enabled_vlans, Some(Vlans::All));

        let desired = from_yaml("name: vs1\nenabled_vlans: [ALL]\n").unwrap();
        assert_eq!(desired.enabled_vlans, Some(Vlans::All));

        let desired = from_yaml("name: vs1\nenabled_vlans: [net1, /Other/net2]\n").unwrap();
        let expected: BTreeSet<String> = ["/Common/net1".to_string(), "/Other/net2".to_string()]
            .into_iter()
            .collect();
        assert_eq!(desired.enabled_vlans, Some(Vlans::Explicit(expected)));
    }

    #[test]
    fn test_vlans_all_mixed_rejected() {
        assert_eq!(
            from_yaml("name: vs1\nenabled_vlans: [ALL, net1]\n"),
            Err(ValidationError::MixedVlans)
        );
    }

    #[test]
    fn test_empty_policies_means_clear() {
        let desired = from_yaml("name: vs1\npolicies: \"\"\n").unwrap();
        assert_eq!(desired.policies, Some(vec![]));

        let desired = from_yaml("name: vs1\npolicies: []\n").unwrap();
        assert_eq!(desired.policies, Some(vec![]));

        let desired = from_yaml("name: vs1\n").unwrap();
        assert_eq!(desired.policies, None);
    }

    #[test]
    fn test_profiles_dedupe_and_context() {
        let desired = from_yaml(
            "name: vs1\nprofiles:\n  - http\n  - http\n  - name: clientssl\n    context: client-side\n",
        )
        .unwrap();
        assert_eq!(
            desired.profiles,
            Some(vec![
                Profile::new("/Common/http", ProfileContext::All),
                Profile::new("/Common/clientssl", ProfileContext::ClientSide),
            ])
        );
    }

    #[test]
    fn test_empty_profiles_rejected() {
        assert_eq!(
            from_yaml("name: vs1\nprofiles: []\n"),
            Err(ValidationError::EmptyProfiles)
        );
        assert_eq!(
            from_yaml("name: vs1\nall_profiles: []\n"),
            Err(ValidationError::EmptyProfiles)
        );
    }

    #[test]
    fn test_profile_bad_context() {
        assert!(matches!(
            from_yaml("name: vs1\nprofiles:\n  - name: tcp\n    context: sideways\n"),
            Err(ValidationError::InvalidProfileContext(_))
        ));
    }

    #[test]
    fn test_pool_clear() {
        let desired = from_yaml("name: vs1\npool: \"\"\n").unwrap();
        assert_eq!(desired.pool.as_deref(), Some(""));
        let desired = from_yaml("name: vs1\npool: web\n").unwrap();
        assert_eq!(desired.pool.as_deref(), Some("/Common/web"));
    }

    #[test]
    fn test_parse_tasks_single_and_list() {
        let tasks = parse_tasks("name: vs1\nport: 80\n").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].port, Some(80));

        let tasks = parse_tasks("- name: vs1\n- name: vs2\n  state: absent\n").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].state, Some(State::Absent));

        let tasks = parse_tasks(r#"[{"name": "vs1", "snat": "automap"}]"#).unwrap();
        assert_eq!(tasks[0].snat.as_deref(), Some("automap"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: std::result::Result<VirtualServerParams, _> =
            serde_yaml::from_str("name: vs1\nbogus: 1\n");
        assert!(parsed.is_err());
    }
}
