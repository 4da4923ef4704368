use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use log::trace;
use peercred_common::Addr;
use thiserror::Error;

use crate::core::domain::{ConnectionRecord, Protocol, SocketState};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("malformed entry in {table}: {line:?}")]
    Malformed { table: &'static str, line: String },
}

/// Live inet connection table of the host
pub trait ConnectionTable: Send + Sync {
    /// Every connection currently visible
    fn snapshot(&self) -> Result<Vec<ConnectionRecord>, LookupError>;

    /// Owning process of a record from [`snapshot`](Self::snapshot).
    ///
    /// Tables that fill `pid` while enumerating need not override this.
    fn owner(&self, record: &ConnectionRecord) -> Result<Option<u32>, LookupError> {
        Ok(record.pid)
    }
}

/// Find the connection whose local and remote endpoints both equal the
/// given ones. `Ok(None)` means nothing matched.
pub fn find(
    table: &dyn ConnectionTable,
    local: Addr,
    remote: Addr,
) -> Result<Option<ConnectionRecord>, LookupError> {
    let local = local.canonical();
    let remote = remote.canonical();

    let found = table.snapshot()?.into_iter().find(|c| {
        Addr::from(c.local).canonical() == local && Addr::from(c.remote).canonical() == remote
    });

    match found {
        Some(mut record) => {
            record.pid = table.owner(&record)?;
            trace!("Matched {:?}", record);
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Connection table read from `<proc>/net/{tcp,tcp6,udp,udp6}`
#[derive(Debug, Clone)]
pub struct ProcNetTable {
    proc_root: PathBuf,
}

impl ProcNetTable {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self { proc_root: proc_root.into() }
    }
}

impl ConnectionTable for ProcNetTable {
    fn snapshot(&self) -> Result<Vec<ConnectionRecord>, LookupError> {
        let mut records = Vec::new();
        for protocol in Protocol::ALL {
            let path = self.proc_root.join("net").join(protocol.table_name());
            let contents = match fs::read_to_string(&path) {
                Ok(c) => c,
                // tcp6/udp6 are absent when IPv6 is disabled
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LookupError::Read { path, source: e }),
            };
            records.extend(parse_table(protocol, &contents)?);
        }
        Ok(records)
    }

    fn owner(&self, record: &ConnectionRecord) -> Result<Option<u32>, LookupError> {
        if record.inode == 0 {
            return Ok(None);
        }
        find_socket_owner(&self.proc_root, record.inode)
    }
}

/// Parse one `/proc/net/*` table, skipping the header line
pub fn parse_table(protocol: Protocol, contents: &str) -> Result<Vec<ConnectionRecord>, LookupError> {
    contents
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            parse_line(protocol, line).ok_or_else(|| LookupError::Malformed {
                table: protocol.table_name(),
                line: line.to_string(),
            })
        })
        .collect()
}

fn parse_line(protocol: Protocol, line: &str) -> Option<ConnectionRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }

    Some(ConnectionRecord {
        protocol,
        local: parse_endpoint(fields[1])?,
        remote: parse_endpoint(fields[2])?,
        state: SocketState::from(u8::from_str_radix(fields[3], 16).ok()?),
        inode: fields[9].parse().ok()?,
        pid: None,
    })
}

/// `0100007F:0CEA` style endpoint. The address words are printed in host
/// byte order, the port already converted from network order.
fn parse_endpoint(field: &str) -> Option<SocketAddr> {
    let (ip_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = match ip_hex.len() {
        8 => IpAddr::V4(Ipv4Addr::from(parse_word(ip_hex)?)),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                chunk.copy_from_slice(&parse_word(ip_hex.get(i * 8..(i + 1) * 8)?)?);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}

fn parse_word(hex: &str) -> Option<[u8; 4]> {
    u32::from_str_radix(hex, 16).ok().map(u32::to_ne_bytes)
}

/// Scan `<proc>/<pid>/fd/*` for a descriptor pointing at `socket:[inode]`.
///
/// Processes that exit or deny access mid-scan are skipped.
fn find_socket_owner(proc_root: &Path, inode: u64) -> Result<Option<u32>, LookupError> {
    let target = format!("socket:[{}]", inode);
    let entries = fs::read_dir(proc_root).map_err(|e| LookupError::Read {
        path: proc_root.to_path_buf(),
        source: e,
    })?;

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(link) = fs::read_link(fd.path()) {
                if link.as_os_str() == target.as_str() {
                    return Ok(Some(pid));
                }
            }
        }
    }

    Ok(None)
}
