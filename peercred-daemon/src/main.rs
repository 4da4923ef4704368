// inet_peercred: Peer credentials of inet sockets over HTTPS
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

//! inet_peercred Daemon
//!
//! Answers "which user owns the other end of this TCP connection?" for
//! local processes connecting from a privileged port.
//!
//! Features:
//! - HTTPS API (`POST /v1/query`)
//! - Connection matching against /proc/net/{tcp,tcp6,udp,udp6}
//! - Real/effective/saved/filesystem uid and gid, plus supplementary groups
//! - Privileged source port gate

pub mod config;
pub mod core;
pub mod crypto;
pub mod logger;
pub mod server;
pub mod state;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(name = "inet_peercred")]
#[command(version, about = "A simple server to provide the peer credentials of an inet socket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an inet_peercred server
    Server(ServerConfig),
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init("info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(config) => {
            crate::server::startup::start_server(config).await?;
        }
    }
    Ok(())
}
