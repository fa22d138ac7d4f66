//! Typed views over controller records.
//!
//! All of these are read-only snapshots of controller state. Field names follow
//! the controller's camelCase JSON; ids and VLANs are accepted as strings or
//! numbers because the controller is not consistent about either.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "String")]
pub enum HostType {
    Wired,
    Wireless,
    #[default]
    Unknown,
    Other(String),
}

impl From<String> for HostType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "wired" => HostType::Wired,
            "wireless" => HostType::Wireless,
            "" => HostType::Unknown,
            _ => HostType::Other(value),
        }
    }
}

impl From<HostType> for String {
    fn from(value: HostType) -> Self {
        match value {
            HostType::Wired => "wired".into(),
            HostType::Wireless => "wireless".into(),
            HostType::Unknown => String::new(),
            HostType::Other(other) => other,
        }
    }
}

impl<'de> Deserialize<'de> for HostType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(lenient_string(deserializer)?
            .map(HostType::from)
            .unwrap_or_default())
    }
}

/// One entry of `GET /host`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub host_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub host_mac: Option<String>,
    #[serde(default)]
    pub host_type: HostType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub connected_network_device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub connected_interface_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vlan_id: Option<String>,
}

/// Where a host is plugged in, before the device id is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPoint {
    /// Wired (or untyped) client on a physical switch port.
    Port { device_id: String, interface: String },
    /// Wireless client behind an access point; only the VLAN is known.
    Vlan { device_id: String, vlan_id: String },
}

impl AttachmentPoint {
    pub fn device_id(&self) -> &str {
        match self {
            AttachmentPoint::Port { device_id, .. } | AttachmentPoint::Vlan { device_id, .. } => {
                device_id
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            AttachmentPoint::Port { interface, .. } => interface.clone(),
            AttachmentPoint::Vlan { vlan_id, .. } => format!("VLAN {vlan_id}"),
        }
    }
}

impl HostRecord {
    /// Normalizes the wired and wireless record shapes into one attachment point.
    pub fn attachment_point(&self) -> Result<AttachmentPoint, String> {
        let device_id = self
            .connected_network_device_id
            .clone()
            .ok_or("host record has no connectedNetworkDeviceId")?;

        match self.host_type {
            HostType::Wireless => {
                let vlan_id = self
                    .vlan_id
                    .clone()
                    .ok_or("wireless host record has no vlanId")?;
                Ok(AttachmentPoint::Vlan { device_id, vlan_id })
            }
            _ => {
                let interface = self
                    .connected_interface_name
                    .clone()
                    .ok_or("wired host record has no connectedInterfaceName")?;
                Ok(AttachmentPoint::Port {
                    device_id,
                    interface,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub hostname: String,
    #[serde(default, rename = "type", deserialize_with = "string_or_empty")]
    pub model: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub serial_number: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub family: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub management_ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseStatus {
    InUse,
    Other(String),
}

impl From<&str> for LicenseStatus {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("INUSE") {
            LicenseStatus::InUse
        } else {
            LicenseStatus::Other(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseEntry {
    pub name: String,
    pub status: LicenseStatus,
}

impl LicenseEntry {
    /// Reads one raw license entry. Entries missing `name` or `status` yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.trim();
        let status = value.get("status")?.as_str()?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            status: LicenseStatus::from(status),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::InUse
    }
}

/// A client resolved to the device and interface it is attached through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResult {
    pub identifier: String,
    pub host_ip: Option<String>,
    pub host_mac: Option<String>,
    pub host_type: HostType,
    pub device: DeviceRecord,
    pub interface_label: String,
    pub vlan_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceSource {
    /// Matched a routed/switched interface address.
    Interface,
    /// Matched a device management address (access points).
    ManagementIp,
}

/// A device that owns an IP address on one of its own interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInterface {
    pub device: DeviceRecord,
    pub port_name: Option<String>,
    pub source: InterfaceSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub hostname: String,
    pub serial_number: String,
    pub licenses: Vec<String>,
}

impl InventoryRow {
    pub fn record(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(2 + self.licenses.len());
        fields.push(self.hostname.clone());
        fields.push(self.serial_number.clone());
        fields.extend(self.licenses.iter().cloned());
        fields
    }
}

/// One entry of `GET /interface/network-device/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub port_name: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub port_mode: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vlan_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub voice_vlan: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mac_address: Option<String>,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub status: String,
}

impl PortRecord {
    pub fn is_access(&self) -> bool {
        self.port_mode.eq_ignore_ascii_case("access")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRow {
    pub hostname: String,
    pub port: PortRecord,
}

impl PortRow {
    pub fn record(&self) -> Vec<String> {
        vec![
            self.hostname.clone(),
            self.port.port_name.clone(),
            self.port.status.clone(),
            self.port.port_mode.clone(),
            self.port.vlan_id.clone().unwrap_or_default(),
            self.port.voice_vlan.clone().unwrap_or_default(),
            self.port.mac_address.clone().unwrap_or_default(),
        ]
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}
