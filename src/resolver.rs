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

//! Maps a client IP or MAC to the device and interface it is attached through.

use crate::catalog::DeviceCatalog;
use crate::client::{ControllerClient, Reply};
use crate::error::{ControllerError, Result};
use crate::model::{AttachmentResult, DeviceInterface, HostRecord, InterfaceSource};
use crate::session::Session;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver<'a> {
    client: &'a ControllerClient,
    session: &'a Session,
    catalog: DeviceCatalog<'a>,
}

#[derive(Debug, Clone, Copy)]
enum HostKey {
    Ip,
    Mac,
}

impl HostKey {
    fn param(self) -> &'static str {
        match self {
            HostKey::Ip => "hostIp",
            HostKey::Mac => "hostMac",
        }
    }
}

impl<'a> IdentityResolver<'a> {
    pub fn new(client: &'a ControllerClient, session: &'a Session) -> Self {
        Self {
            client,
            session,
            catalog: DeviceCatalog::new(client, session),
        }
    }

    /// `Ok(None)` when no client currently holds `ip`.
    pub fn resolve_by_ip(&self, ip: &str) -> Result<Option<AttachmentResult>> {
        self.resolve(HostKey::Ip, ip)
    }

    /// Like [`resolve_by_ip`](Self::resolve_by_ip); the result also carries
    /// the IP the controller associates with the MAC. A MAC the controller
    /// cannot parse yields [`ControllerError::MalformedInput`].
    pub fn resolve_by_mac(&self, mac: &str) -> Result<Option<AttachmentResult>> {
        self.resolve(HostKey::Mac, mac)
    }

    /// Finds the network device that owns `ip` on one of its interfaces,
    /// falling back to a management-address lookup for access points.
    pub fn resolve_interface_by_ip(&self, ip: &str) -> Result<Option<DeviceInterface>> {
        let reply = self
            .client
            .get_optional(self.session, &["interface", "ip-address", ip], &[])?;

        if let Reply::Success(body) = reply
            && let Some((port_name, device_id)) = first_interface(&body)
        {
            let device = self.catalog.describe_device(&device_id)?;
            return Ok(Some(DeviceInterface {
                device,
                port_name: Some(port_name),
                source: InterfaceSource::Interface,
            }));
        }

        debug!(ip, "no interface record, trying management address");
        Ok(self
            .catalog
            .device_by_management_ip(ip)?
            .map(|device| DeviceInterface {
                device,
                port_name: None,
                source: InterfaceSource::ManagementIp,
            }))
    }

    fn resolve(&self, key: HostKey, identifier: &str) -> Result<Option<AttachmentResult>> {
        let Some(host) = self.lookup_host(key, identifier)? else {
            debug!(identifier, "no host record");
            return Ok(None);
        };

        let point = host
            .attachment_point()
            .map_err(|reason| ControllerError::payload("host", reason))?;
        let device = self.catalog.describe_device(point.device_id())?;

        let (host_ip, host_mac) = match key {
            HostKey::Ip => (
                host.host_ip.or_else(|| Some(identifier.to_string())),
                host.host_mac,
            ),
            HostKey::Mac => (
                host.host_ip,
                host.host_mac.or_else(|| Some(identifier.to_string())),
            ),
        };

        Ok(Some(AttachmentResult {
            identifier: identifier.to_string(),
            host_ip,
            host_mac,
            host_type: host.host_type,
            device,
            interface_label: point.label(),
            vlan_id: host.vlan_id,
        }))
    }

    /// The controller answers an identifier it cannot parse with an error
    /// object instead of a record list, on a 2xx or a 4xx reply alike.
    fn lookup_host(&self, key: HostKey, value: &str) -> Result<Option<HostRecord>> {
        let raw = self
            .client
            .get_raw(self.session, &["host"], &[(key.param(), value)])?;

        if !raw.status().is_success() {
            let rejection = if raw.status().is_client_error()
                && !matches!(
                    raw.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) {
                raw.json()
                    .and_then(|body| body.get("response").cloned())
                    .filter(is_rejection)
            } else {
                None
            };
            return match rejection {
                Some(response) => Err(ControllerError::MalformedInput {
                    input: value.to_string(),
                    message: rejection_message(Some(&response)),
                }),
                None => Err(raw.into_error()),
            };
        }

        let body = raw.into_json()?;
        let records = match body.get("response") {
            Some(Value::Array(records)) => records,
            other => {
                return Err(ControllerError::MalformedInput {
                    input: value.to_string(),
                    message: rejection_message(other),
                });
            }
        };

        // At most one active mapping per identifier; extra entries are stale.
        records
            .first()
            .map(|record| {
                HostRecord::deserialize(record)
                    .map_err(|e| ControllerError::payload("host", e.to_string()))
            })
            .transpose()
    }
}

fn first_interface(body: &Value) -> Option<(String, String)> {
    let interface = match body.get("response")? {
        Value::Array(items) => items.first()?,
        obj @ Value::Object(_) => obj,
        _ => return None,
    };
    let port_name = interface.get("portName")?.as_str()?.to_string();
    let device_id = match interface.get("deviceId")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((port_name, device_id))
}

fn is_rejection(response: &Value) -> bool {
    ["message", "detail", "errorCode"]
        .iter()
        .any(|field| response.get(*field).is_some_and(Value::is_string))
}

fn rejection_message(response: Option<&Value>) -> String {
    let detail = response.and_then(|r| {
        ["message", "detail", "errorCode"]
            .iter()
            .find_map(|field| r.get(*field).and_then(|v| v.as_str()))
    });
    match (detail, response) {
        (Some(detail), _) => detail.to_string(),
        (None, Some(Value::String(text))) => text.clone(),
        _ => "response is not a host record list".to_string(),
    }
}
