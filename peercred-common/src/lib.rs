// peercred-common: Shared wire types for inet_peercred
// Copyright (C) 2026 khoinp1012
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Shared types and constants for the inet_peercred service
//!
//! This crate contains the JSON wire format spoken between the daemon
//! and the processes that query it.

use serde::{Deserialize, Serialize};

pub mod addr;

pub use addr::Addr;

/// Route of the v1 query endpoint
pub const QUERY_PATH: &str = "/v1/query";

/// Port the daemon listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 411;

/// Highest source port a caller may connect from
pub const MAX_PRIVILEGED_PORT: u16 = 1024;

/// Body of `POST /v1/query`
///
/// Both addresses are given from the caller's point of view: `local_addr`
/// is the caller's own end of the connection, `remote_addr` is the peer
/// whose owner it wants to identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Query {
    pub local_addr: Addr,
    pub remote_addr: Addr,
}

/// Real, effective, saved and filesystem identities of one dimension
/// (user or group), resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resf {
    pub real: String,
    pub effective: String,
    pub saved: String,
    pub filesystem: String,
}

/// Successful answer to a [`V1Query`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Response {
    pub user: Resf,
    pub groups: Resf,
    pub supplementary_groups: Vec<String>,
}
