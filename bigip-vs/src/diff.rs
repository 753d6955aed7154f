//! Attribute-level difference between desired and observed state.
//!
//! Only attributes supplied in the desired state are compared. The result
//! holds the new value for every attribute that has to change; an empty
//! [`Changes`] means the resource has converged.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::ValidationError;
use crate::model::{DesiredState, Destination, ObservedState, Profile, Snat, Vlans};

/// Attributes to apply to the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Changes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<Profile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snat: Option<Snat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_vlans: Option<Vlans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<String>>,
    /// Empty string removes the default pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irules: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        *self == Changes::default()
    }

    /// Names of the attributes carried, for logging.
    pub fn attributes(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.description.is_some() {
            names.push("description");
        }
        if self.destination.is_some() {
            names.push("destination");
        }
        if self.profiles.is_some() {
            names.push("profiles");
        }
        if self.snat.is_some() {
            names.push("snat");
        }
        if self.enabled_vlans.is_some() {
            names.push("enabled_vlans");
        }
        if self.policies.is_some() {
            names.push("policies");
        }
        if self.pool.is_some() {
            names.push("pool");
        }
        if self.irules.is_some() {
            names.push("irules");
        }
        if self.enabled.is_some() {
            names.push("enabled");
        }
        names
    }
}

/// Changes needed to create the resource from nothing.
pub fn for_create(want: &DesiredState) -> Result<Changes, ValidationError> {
    let address = want
        .destination
        .clone()
        .ok_or_else(|| ValidationError::DestinationRequired(want.full_name().to_string()))?;

    let profiles = match (&want.profiles, &want.all_profiles) {
        (None, None) => None,
        (p, a) => {
            let mut merged: Vec<Profile> = Vec::new();
            for profile in p.iter().flatten().chain(a.iter().flatten()) {
                if !merged.contains(profile) {
                    merged.push(profile.clone());
                }
            }
            Some(merged).filter(|m| !m.is_empty())
        }
    };

    Ok(Changes {
        description: want.description.clone().filter(|d| !d.is_empty()),
        destination: Some(Destination::new(address, want.port.unwrap_or(0))),
        profiles,
        snat: want.snat.clone().filter(|s| *s != Snat::None),
        enabled_vlans: want.enabled_vlans.clone().filter(|v| *v != Vlans::All),
        policies: want.policies.clone().filter(|p| !p.is_empty()),
        pool: want.pool.clone().filter(|p| !p.is_empty()),
        irules: want.irules.clone().filter(|r| !r.is_empty()),
        enabled: want.state.admin_enabled().filter(|enabled| !enabled),
    })
}

/// Changes needed to move an existing resource to the desired state.
pub fn for_update(want: &DesiredState, have: &ObservedState) -> Result<Changes, ValidationError> {
    if want.profiles.is_some() && want.all_profiles.is_some() {
        return Err(ValidationError::ProfilesConflict);
    }

    let mut changes = Changes::default();

    if let Some(description) = &want.description
        && have.description.as_deref().unwrap_or("") != description
    {
        changes.description = Some(description.clone());
    }

    if want.destination.is_some() || want.port.is_some() {
        let address = want
            .destination
            .clone()
            .or_else(|| have.destination.as_ref().map(|d| d.address.clone()));
        if let Some(address) = address {
            let port = want
                .port
                .or(have.destination.as_ref().map(|d| d.port))
                .unwrap_or(0);
            let target = Destination::new(address, port);
            if have.destination.as_ref() != Some(&target) {
                changes.destination = Some(target);
            }
        }
    }

    if let Some(profiles) = &want.profiles
        && !same_set(profiles, &have.profiles)
    {
        changes.profiles = Some(profiles.clone());
    }

    if let Some(snat) = &want.snat
        && *snat != have.snat
    {
        changes.snat = Some(snat.clone());
    }

    if let Some(vlans) = &want.enabled_vlans
        && *vlans != have.enabled_vlans
    {
        changes.enabled_vlans = Some(vlans.clone());
    }

    if let Some(policies) = &want.policies
        && !same_set(policies, &have.policies)
    {
        changes.policies = Some(policies.clone());
    }

    if let Some(pool) = &want.pool
        && have.pool.as_deref().unwrap_or("") != pool
    {
        changes.pool = Some(pool.clone());
    }

    // iRule order is evaluation order on the device.
    if let Some(irules) = &want.irules
        && *irules != have.irules
    {
        changes.irules = Some(irules.clone());
    }

    if let Some(enabled) = want.state.admin_enabled()
        && enabled != have.enabled
    {
        changes.enabled = Some(enabled);
    }

    Ok(changes)
}

fn same_set<T: Ord>(a: &[T], b: &[T]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}
