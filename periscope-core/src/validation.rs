//! Query validation against the instance configuration

use std::net::IpAddr;

use crate::config::Params;
use crate::device::{Device, Devices};
use crate::error::ValidationError;
use crate::identity::Fingerprint;
use crate::query::Query;
use crate::QueryType;

/// Longest accepted query target.
pub const MAX_TARGET_LEN: usize = 256;

/// A query that passed validation, paired with the device it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    query: Query,
    device: Device,
}

impl ValidatedQuery {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn query_type(&self) -> QueryType {
        self.query.query_type
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.query.fingerprint()
    }
}

/// Validate a query and resolve its device.
///
/// Whitespace around the target and location is trimmed first, so
/// `" 192.0.2.1 "` and `"192.0.2.1"` share a fingerprint.
pub fn validate_query(
    mut query: Query,
    params: &Params,
    devices: &Devices,
) -> Result<ValidatedQuery, ValidationError> {
    query.query_location = query.query_location.trim().to_string();
    query.query_target = query.query_target.trim().to_string();
    query.query_vrf = query.query_vrf.trim().to_string();

    if !params.is_enabled(query.query_type) {
        return Err(ValidationError::QueryTypeDisabled {
            query_type: query.query_type,
        });
    }

    let device = devices
        .get(&query.query_location)
        .ok_or_else(|| ValidationError::DeviceNotFound {
            name: query.query_location.clone(),
        })?
        .clone();

    if !device.has_vrf(&query.query_vrf) {
        return Err(ValidationError::VrfNotFound {
            device: device.name.clone(),
            vrf: query.query_vrf.clone(),
        });
    }

    validate_target(query.query_type, &query.query_target)?;

    Ok(ValidatedQuery { query, device })
}

/// Check a target's syntax for the given query type.
pub fn validate_target(query_type: QueryType, target: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidTarget {
        query_type,
        reason: reason.to_string(),
    };

    if target.is_empty() {
        return Err(invalid("target is empty"));
    }
    if target.len() > MAX_TARGET_LEN {
        return Err(invalid("target is too long"));
    }

    match query_type {
        QueryType::Ping | QueryType::Traceroute => target
            .parse::<IpAddr>()
            .map(|_| ())
            .map_err(|_| invalid("expected an IP address")),
        QueryType::BgpRoute => {
            if is_ip_or_prefix(target) {
                Ok(())
            } else {
                Err(invalid("expected an IP address or prefix"))
            }
        }
        QueryType::BgpCommunity => {
            if is_community(target) {
                Ok(())
            } else {
                Err(invalid("expected a standard (A:B) or large (A:B:C) community"))
            }
        }
        QueryType::BgpAspath => {
            if is_aspath_expression(target) {
                Ok(())
            } else {
                Err(invalid("expected an AS path expression"))
            }
        }
    }
}

fn is_ip_or_prefix(target: &str) -> bool {
    match target.split_once('/') {
        None => target.parse::<IpAddr>().is_ok(),
        Some((addr, len)) => {
            let Ok(addr) = addr.parse::<IpAddr>() else {
                return false;
            };
            let Ok(len) = len.parse::<u8>() else {
                return false;
            };
            match addr {
                IpAddr::V4(_) => len <= 32,
                IpAddr::V6(_) => len <= 128,
            }
        }
    }
}

fn is_community(target: &str) -> bool {
    let parts: Vec<&str> = target.split(':').collect();
    match parts.as_slice() {
        [asn, value] => asn.parse::<u16>().is_ok() && value.parse::<u16>().is_ok(),
        [global, local1, local2] => {
            global.parse::<u32>().is_ok()
                && local1.parse::<u32>().is_ok()
                && local2.parse::<u32>().is_ok()
        }
        _ => false,
    }
}

fn is_aspath_expression(target: &str) -> bool {
    target.chars().any(|c| c.is_ascii_digit())
        && target
            .chars()
            .all(|c| c.is_ascii_digit() || " ^$_.*+?()[]|-".contains(c))
}
