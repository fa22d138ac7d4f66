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

use thiserror::Error;

/// Failures raised while talking to the controller.
///
/// A lookup that simply finds nothing is not an error: resolver operations
/// return `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("ticket request failed: {0}")]
    Auth(String),

    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("controller rejected `{input}`: {message}")]
    MalformedInput { input: String, message: String },

    #[error("{resource} is not known to the controller")]
    NotFound { resource: String },

    #[error("unexpected payload from {endpoint}: {reason}")]
    UnexpectedPayload { endpoint: String, reason: String },
}

impl ControllerError {
    pub fn transport(
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self::Transport {
            url: url.into(),
            status,
            message: match status {
                Some(code) => format!("HTTP {code}: {message}"),
                None => message,
            },
        }
    }

    pub fn payload(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_includes_status_when_known() {
        let err = ControllerError::transport("https://c/api/v1/host", Some(500), "server error");
        assert_eq!(
            err.to_string(),
            "request to https://c/api/v1/host failed: HTTP 500: server error"
        );

        let err = ControllerError::transport("https://c/api/v1/host", None, "connection refused");
        assert_eq!(
            err.to_string(),
            "request to https://c/api/v1/host failed: connection refused"
        );
    }
}
