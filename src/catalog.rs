// apicctl - CLI for locating hosts and inventorying devices on a network controller
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::client::{ControllerClient, Reply};
use crate::error::{ControllerError, Result};
use crate::model::{DeviceRecord, LicenseEntry, PortRecord};
use crate::session::Session;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

pub const SWITCH_FAMILY: &str = "Switches and Hubs";

/// Read-only access to the controller's network-device inventory.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCatalog<'a> {
    client: &'a ControllerClient,
    session: &'a Session,
}

impl<'a> DeviceCatalog<'a> {
    pub fn new(client: &'a ControllerClient, session: &'a Session) -> Self {
        Self { client, session }
    }

    /// Ids of every known device, in controller order, optionally limited to
    /// one device family (exact match).
    pub fn list_device_ids(&self, family: Option<&str>) -> Result<Vec<String>> {
        let body = self.client.get(self.session, &["network-device"], &[])?;
        let devices = response_list(&body, "network-device")?;

        let ids: Vec<String> = devices
            .iter()
            .filter_map(|device| {
                let record = DeviceRecord::deserialize(device).ok()?;
                if record.id.is_empty() {
                    return None;
                }
                match family {
                    Some(wanted) if record.family != wanted => None,
                    _ => Some(record.id),
                }
            })
            .collect();

        debug!(count = ids.len(), family = ?family, "listed devices");
        Ok(ids)
    }

    /// A 404 or empty reply is [`ControllerError::NotFound`]: the id came from
    /// the controller, so a missing record is still a failure.
    pub fn describe_device(&self, id: &str) -> Result<DeviceRecord> {
        let reply = self
            .client
            .get_optional(self.session, &["network-device", id], &[])?;
        let body = match reply {
            Reply::Success(body) => body,
            Reply::NotFound => {
                return Err(ControllerError::NotFound {
                    resource: format!("network device {id}"),
                });
            }
        };

        let mut device = response_object(&body, "network-device")?;
        if device.id.is_empty() {
            device.id = id.to_string();
        }
        Ok(device)
    }

    /// Looks a device up by its management address. Access points are only
    /// reachable this way.
    pub fn device_by_management_ip(&self, ip: &str) -> Result<Option<DeviceRecord>> {
        let reply = self
            .client
            .get_optional(self.session, &["network-device", "ip-address", ip], &[])?;
        let body = match reply {
            Reply::Success(body) => body,
            Reply::NotFound => return Ok(None),
        };

        match body.get("response") {
            Some(Value::Object(_)) => {
                let device = response_object(&body, "network-device/ip-address")?;
                if device.id.is_empty() && device.hostname.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(device))
                }
            }
            _ => Ok(None),
        }
    }

    /// Distinct names of in-use licenses, first-seen order. Devices without a
    /// license listing (access points) give an empty list.
    pub fn active_licenses(&self, id: &str) -> Result<Vec<String>> {
        let reply = self
            .client
            .get_optional(self.session, &["license-info", "network-device", id], &[])?;
        let body = match reply {
            Reply::Success(body) => body,
            Reply::NotFound => return Ok(Vec::new()),
        };
        let Some(Value::Array(entries)) = body.get("response") else {
            debug!(device = id, "no license listing");
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        Ok(entries
            .iter()
            .filter_map(LicenseEntry::from_value)
            .filter(LicenseEntry::is_active)
            .filter(|entry| seen.insert(entry.name.clone()))
            .map(|entry| entry.name)
            .collect())
    }

    /// Interfaces of one device, in controller order.
    pub fn device_ports(&self, id: &str) -> Result<Vec<PortRecord>> {
        let body = self
            .client
            .get(self.session, &["interface", "network-device", id], &[])?;
        let ports = response_list(&body, "interface/network-device")?;

        Ok(ports
            .iter()
            .filter_map(|port| match PortRecord::deserialize(port) {
                Ok(record) => Some(record),
                Err(err) => {
                    debug!(device = id, error = %err, "skipping unreadable interface entry");
                    None
                }
            })
            .collect())
    }
}

pub(crate) fn response_list<'v>(body: &'v Value, endpoint: &str) -> Result<&'v Vec<Value>> {
    match body.get("response") {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(ControllerError::payload(endpoint, "`response` is not a list")),
    }
}

fn response_object(body: &Value, endpoint: &str) -> Result<DeviceRecord> {
    match body.get("response") {
        Some(value @ Value::Object(_)) => DeviceRecord::deserialize(value)
            .map_err(|e| ControllerError::payload(endpoint, e.to_string())),
        _ => Err(ControllerError::payload(endpoint, "`response` is not an object")),
    }
}
