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

use crate::client::ControllerClient;
use crate::error::{ControllerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// A service ticket issued by the controller.
///
/// Held for the whole run and passed by reference into every lookup; there is
/// no expiry tracking or refresh.
#[derive(Clone)]
pub struct Session {
    ticket: String,
    issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ticket", &"*****")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct SessionManager<'a> {
    client: &'a ControllerClient,
    credentials: Credentials,
}

impl<'a> SessionManager<'a> {
    pub fn new(client: &'a ControllerClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Exchanges the credentials for a ticket. Sends exactly one request.
    pub fn acquire(&self) -> Result<Session> {
        let body = self
            .client
            .post_json(&["ticket"], &self.credentials)
            .map_err(|e| ControllerError::Auth(e.to_string()))?;

        let ticket = body
            .pointer("/response/serviceTicket")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ControllerError::Auth("response did not contain response.serviceTicket".into())
            })?;

        let session = Session::new(ticket);
        info!(
            user = %self.credentials.username,
            issued_at = %session.issued_at(),
            "acquired controller service ticket"
        );
        Ok(session)
    }
}
