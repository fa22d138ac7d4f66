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

use crate::catalog::DeviceCatalog;
use crate::error::Result;
use crate::model::{InventoryRow, PortRow};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

/// Builds fleet-wide reports on top of a [`DeviceCatalog`].
///
/// With `jobs > 1` the per-device lookups run on a bounded thread pool that is
/// built once and shared by every report. Rows always come back in device
/// enumeration order.
pub struct InventoryAggregator<'a> {
    catalog: DeviceCatalog<'a>,
    pool: Option<ThreadPool>,
}

impl<'a> InventoryAggregator<'a> {
    pub fn new(catalog: DeviceCatalog<'a>, jobs: usize) -> Self {
        Self {
            catalog,
            pool: worker_pool(jobs),
        }
    }

    /// One row per device: hostname, serial number, in-use licenses.
    pub fn build_fleet_inventory(&self, family: Option<&str>) -> Result<Vec<InventoryRow>> {
        let ids = self.catalog.list_device_ids(family)?;
        let rows = self.for_each_device(&ids, |id| self.inventory_row(id))?;
        info!(devices = rows.len(), "built license inventory");
        Ok(rows)
    }

    /// Port rows for every matching device. Only access ports unless
    /// `all_ports` is set.
    pub fn build_switchport_inventory(
        &self,
        family: Option<&str>,
        all_ports: bool,
    ) -> Result<Vec<PortRow>> {
        let ids = self.catalog.list_device_ids(family)?;
        let per_device = self.for_each_device(&ids, |id| self.port_rows(id, all_ports))?;
        let rows: Vec<PortRow> = per_device.into_iter().flatten().collect();
        info!(devices = ids.len(), ports = rows.len(), "built switchport inventory");
        Ok(rows)
    }

    fn inventory_row(&self, id: &str) -> Result<InventoryRow> {
        let device = self.catalog.describe_device(id)?;
        let licenses = self.catalog.active_licenses(id).unwrap_or_else(|err| {
            warn!(device = id, error = %err, "license lookup failed, reporting none");
            Vec::new()
        });
        Ok(InventoryRow {
            hostname: device.hostname,
            serial_number: device.serial_number,
            licenses,
        })
    }

    fn port_rows(&self, id: &str, all_ports: bool) -> Result<Vec<PortRow>> {
        let device = self.catalog.describe_device(id)?;
        let ports = self.catalog.device_ports(id).unwrap_or_else(|err| {
            warn!(device = id, error = %err, "interface lookup failed, reporting none");
            Vec::new()
        });
        Ok(ports
            .into_iter()
            .filter(|port| all_ports || port.is_access())
            .map(|port| PortRow {
                hostname: device.hostname.clone(),
                port,
            })
            .collect())
    }

    fn for_each_device<T, F>(&self, ids: &[String], fetch: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&str) -> Result<T> + Sync,
    {
        match &self.pool {
            // Indexed parallel collect keeps input order.
            Some(pool) if ids.len() > 1 => {
                pool.install(|| ids.par_iter().map(|id| fetch(id.as_str())).collect())
            }
            _ => ids.iter().map(|id| fetch(id.as_str())).collect(),
        }
    }
}

fn worker_pool(jobs: usize) -> Option<ThreadPool> {
    if jobs <= 1 {
        return None;
    }
    match ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("apicctl-fetch-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(error = %err, "could not start worker pool, fetching sequentially");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SWITCH_FAMILY;
    use crate::client::ControllerClient;
    use crate::session::Session;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &MockServer) -> ControllerClient {
        ControllerClient::new(
            &format!("{}/api/v1", server.base_url()),
            false,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn mock_fleet(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device");
            then.status(200).json_body(json!({"response": [
                {"id": "D1", "family": "Switches and Hubs"},
                {"id": "AP1", "family": "Unified AP"},
                {"id": "D2", "family": "Switches and Hubs"},
                {"id": "D3", "family": "Switches and Hubs"}
            ]}));
        });
        for (id, hostname, serial) in [
            ("D1", "SW1", "FOC0001"),
            ("AP1", "AP-LOBBY", "FGL0002"),
            ("D2", "SW2", "FOC0003"),
            ("D3", "SW3", "FOC0004"),
        ] {
            let body = json!({"response": {"hostname": hostname, "serialNumber": serial}});
            server.mock(move |when, then| {
                when.method(GET).path(format!("/api/v1/network-device/{id}"));
                then.status(200).json_body(body);
            });
        }
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/license-info/network-device/D1");
            then.status(200).json_body(json!({"response": [
                {"name": "ipbase", "status": "INUSE"},
                {"name": "ipbase", "status": "INUSE"},
                {"name": "lanbase", "status": "INUSE"}
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/license-info/network-device/AP1");
            then.status(200)
                .json_body(json!({"response": {"errorCode": "NotSupported"}}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/license-info/network-device/D2");
            then.status(500).body("license service unavailable");
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/license-info/network-device/D3");
            then.status(200).json_body(json!({"response": [
                {"name": "ipservices", "status": "INUSE"},
                {"name": "ipbase", "status": "EXPIRED"}
            ]}));
        });
    }

    fn hostnames(rows: &[InventoryRow]) -> Vec<&str> {
        rows.iter().map(|r| r.hostname.as_str()).collect()
    }

    #[test]
    fn fleet_inventory_follows_enumeration_order() {
        let server = MockServer::start();
        mock_fleet(&server);

        let client = client_for(&server);
        let session = Session::new("T1");
        let rows = InventoryAggregator::new(DeviceCatalog::new(&client, &session), 1)
            .build_fleet_inventory(None)
            .unwrap();

        assert_eq!(hostnames(&rows), vec!["SW1", "AP-LOBBY", "SW2", "SW3"]);
        assert_eq!(rows[0].record(), vec!["SW1", "FOC0001", "ipbase", "lanbase"]);
        assert!(rows[1].licenses.is_empty());
        // a failed license call does not abort the scan
        assert!(rows[2].licenses.is_empty());
        assert_eq!(rows[3].licenses, vec!["ipservices"]);
    }

    #[test]
    fn parallel_fetch_keeps_order() {
        let server = MockServer::start();
        mock_fleet(&server);

        let client = client_for(&server);
        let session = Session::new("T1");
        let catalog = DeviceCatalog::new(&client, &session);
        let sequential = InventoryAggregator::new(catalog, 1)
            .build_fleet_inventory(None)
            .unwrap();
        let parallel = InventoryAggregator::new(catalog, 4)
            .build_fleet_inventory(None)
            .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn worker_pool_is_shared_across_reports() {
        let server = MockServer::start();
        mock_fleet(&server);

        let client = client_for(&server);
        let session = Session::new("T1");
        let catalog = DeviceCatalog::new(&client, &session);
        assert!(InventoryAggregator::new(catalog, 1).pool.is_none());

        let aggregator = InventoryAggregator::new(catalog, 3);
        assert_eq!(aggregator.pool.as_ref().unwrap().current_num_threads(), 3);

        let first = aggregator.build_fleet_inventory(None).unwrap();
        let second = aggregator.build_fleet_inventory(None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unreachable_device_list_fails_the_report() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device");
            then.status(404);
        });

        let client = client_for(&server);
        let session = Session::new("T1");
        let result = InventoryAggregator::new(DeviceCatalog::new(&client, &session), 2)
            .build_fleet_inventory(None);
        assert!(result.is_err());
    }

    #[test]
    fn family_filter_matches_listed_ids() {
        let server = MockServer::start();
        mock_fleet(&server);

        let client = client_for(&server);
        let session = Session::new("T1");
        let catalog = DeviceCatalog::new(&client, &session);
        let ids = catalog.list_device_ids(Some(SWITCH_FAMILY)).unwrap();
        let rows = InventoryAggregator::new(catalog, 2)
            .build_fleet_inventory(Some(SWITCH_FAMILY))
            .unwrap();

        assert_eq!(ids.len(), rows.len());
        assert_eq!(hostnames(&rows), vec!["SW1", "SW2", "SW3"]);
    }

    #[test]
    fn describe_failure_aborts_report() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device");
            then.status(200)
                .json_body(json!({"response": [{"id": "gone", "family": "Routers"}]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device/gone");
            then.status(404);
        });

        let client = client_for(&server);
        let session = Session::new("T1");
        let result = InventoryAggregator::new(DeviceCatalog::new(&client, &session), 1)
            .build_fleet_inventory(None);
        assert!(result.is_err());
    }

    #[test]
    fn switchport_inventory_lists_access_ports() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device");
            then.status(200).json_body(json!({"response": [
                {"id": "D1", "family": "Switches and Hubs"},
                {"id": "R1", "family": "Routers"}
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/network-device/D1");
            then.status(200)
                .json_body(json!({"response": {"hostname": "SW1", "serialNumber": "FOC0001"}}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/interface/network-device/D1");
            then.status(200).json_body(json!({"response": [
                {"portName": "GigabitEthernet1/0/1", "portMode": "access", "vlanId": "10",
                 "voiceVlan": "20", "macAddress": "00:aa:bb:cc:dd:01", "status": "up"},
                {"portName": "GigabitEthernet1/1/1", "portMode": "trunk", "vlanId": "1", "status": "up"},
                {"portName": "GigabitEthernet1/0/2", "portMode": "access", "vlanId": "10", "status": "down"}
            ]}));
        });

        let client = client_for(&server);
        let session = Session::new("T1");
        let aggregator = InventoryAggregator::new(DeviceCatalog::new(&client, &session), 1);

        let access = aggregator
            .build_switchport_inventory(Some(SWITCH_FAMILY), false)
            .unwrap();
        assert_eq!(access.len(), 2);
        assert_eq!(
            access[0].record(),
            vec!["SW1", "GigabitEthernet1/0/1", "up", "access", "10", "20", "00:aa:bb:cc:dd:01"]
        );
        assert_eq!(access[1].port.port_name, "GigabitEthernet1/0/2");

        let all = aggregator
            .build_switchport_inventory(Some(SWITCH_FAMILY), true)
            .unwrap();
        assert_eq!(all.len(), 3);
    }
}
