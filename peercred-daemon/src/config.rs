use anyhow::{bail, Result};
use clap::Args;
use peercred_common::DEFAULT_PORT;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

/// Flags of the `server` subcommand. Each can also come from the
/// environment.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Path to the server certificate (PEM)
    #[arg(long, env = "CERT")]
    pub cert: Option<PathBuf>,

    /// Path to the server private key (PEM)
    #[arg(long, env = "KEY")]
    pub key: Option<PathBuf>,

    /// Address to accept HTTPS connections on
    #[arg(long, env = "LISTEN", default_value_t = default_listen())]
    pub listen: SocketAddr,

    /// Upper bound on the host table reads of a single query
    #[arg(long, env = "LOOKUP_TIMEOUT_MS", default_value_t = DEFAULT_LOOKUP_TIMEOUT_MS)]
    pub lookup_timeout_ms: u64,

    /// Time allowed for the TLS handshake and for each request's headers
    #[arg(long, env = "HANDSHAKE_TIMEOUT_MS", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    pub handshake_timeout_ms: u64,

    /// Mount point of procfs
    #[arg(long, env = "PROC_ROOT", default_value = "/proc", hide = true)]
    pub proc_root: PathBuf,
}

impl ServerConfig {
    /// Startup-time checks. A failure here is fatal.
    ///
    /// Returns the certificate and key paths.
    pub fn validate(&self) -> Result<(&Path, &Path)> {
        let (Some(cert), Some(key)) = (self.cert.as_deref(), self.key.as_deref()) else {
            bail!("Server requires a certificate and key (--cert/--key or CERT/KEY)");
        };
        if self.lookup_timeout_ms == 0 {
            bail!("--lookup-timeout-ms must be greater than zero");
        }
        if self.handshake_timeout_ms == 0 {
            bail!("--handshake-timeout-ms must be greater than zero");
        }
        Ok((cert, key))
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
