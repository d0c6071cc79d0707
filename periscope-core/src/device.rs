//! Device definitions and the unique-keyed device collection

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::DEFAULT_VRF;

fn default_vrfs() -> Vec<String> {
    vec![DEFAULT_VRF.to_string()]
}

/// A network device queries can be run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique name, referenced by `Query::query_location`
    pub name: String,
    /// Name shown to users
    #[serde(default)]
    pub display_name: Option<String>,
    /// Grouping label (site, region, network)
    #[serde(default)]
    pub network: Option<String>,
    /// Whether this device returns structured BGP output
    #[serde(default)]
    pub structured_output: bool,
    /// VRFs queries may target on this device
    #[serde(default = "default_vrfs")]
    pub vrfs: Vec<String>,
    /// Agent endpoint that executes commands for this device
    #[serde(default)]
    pub agent_url: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            network: None,
            structured_output: false,
            vrfs: default_vrfs(),
            agent_url: None,
        }
    }

    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    pub fn with_agent_url(mut self, url: impl Into<String>) -> Self {
        self.agent_url = Some(url.into());
        self
    }

    pub fn has_vrf(&self, vrf: &str) -> bool {
        self.vrfs.iter().any(|v| v == vrf)
    }

    /// API-facing view. Agent endpoints are never exposed.
    pub fn export_api(&self) -> DeviceExport {
        DeviceExport {
            name: self.name.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            network: self.network.clone(),
            structured_output: self.structured_output,
            vrfs: self.vrfs.clone(),
        }
    }
}

/// Public representation of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeviceExport {
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub structured_output: bool,
    pub vrfs: Vec<String>,
}

/// Collection of devices, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Devices {
    items: Vec<Device>,
}

impl Devices {
    /// Build a collection, rejecting duplicate names.
    pub fn new(items: Vec<Device>) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for device in &items {
            if device.name.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "devices[].name".to_string(),
                });
            }
            if !seen.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateDevice {
                    name: device.name.clone(),
                });
            }
        }
        Ok(Self { items })
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.items.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sorted device names.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.items.iter().map(|d| d.name.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn export_api(&self) -> Vec<DeviceExport> {
        self.items.iter().map(Device::export_api).collect()
    }
}

impl<'de> Deserialize<'de> for Devices {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = Vec::<Device>::deserialize(deserializer)?;
        Devices::new(items).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Devices::new(vec![Device::new("r1"), Device::new("r1")]);
        assert_eq!(
            result,
            Err(ConfigError::DuplicateDevice {
                name: "r1".to_string()
            })
        );
    }

    #[test]
    fn test_lookup_and_ids() -> Result<(), ConfigError> {
        let devices = Devices::new(vec![Device::new("zrh1"), Device::new("ams1")])?;
        assert!(devices.get("ams1").is_some());
        assert!(devices.get("nyc1").is_none());
        assert_eq!(devices.ids(), vec!["ams1", "zrh1"]);
        Ok(())
    }

    #[test]
    fn test_export_hides_agent_url() -> Result<(), serde_json::Error> {
        let device = Device::new("r1").with_agent_url("http://10.0.0.1:8080");
        let json = serde_json::to_string(&device.export_api())?;
        assert!(!json.contains("10.0.0.1"));
        assert!(json.contains("\"display_name\":\"r1\""));
        Ok(())
    }

    #[test]
    fn test_deserialize_defaults_vrf() -> Result<(), serde_json::Error> {
        let devices: Devices = serde_json::from_str(r#"[{"name": "r1"}]"#)?;
        let r1 = devices.get("r1").map(|d| d.vrfs.clone());
        assert_eq!(r1, Some(vec!["default".to_string()]));
        Ok(())
    }
}
