use std::net::SocketAddr;

/// Transport of an entry in the inet connection table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Tcp6, Protocol::Udp, Protocol::Udp6];

    /// File name of the table under `<proc>/net/`
    pub fn table_name(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        }
    }
}

/// Socket state as reported in the `st` column (include/net/tcp_states.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    Unknown(u8),
}

impl From<u8> for SocketState {
    fn from(code: u8) -> Self {
        match code {
            0x01 => SocketState::Established,
            0x02 => SocketState::SynSent,
            0x03 => SocketState::SynRecv,
            0x04 => SocketState::FinWait1,
            0x05 => SocketState::FinWait2,
            0x06 => SocketState::TimeWait,
            0x07 => SocketState::Close,
            0x08 => SocketState::CloseWait,
            0x09 => SocketState::LastAck,
            0x0A => SocketState::Listen,
            0x0B => SocketState::Closing,
            0x0C => SocketState::NewSynRecv,
            other => SocketState::Unknown(other),
        }
    }
}

/// One row of the host connection table at the time it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: SocketState,
    pub inode: u64,
    /// Process holding the socket, if one was visible when the table was read
    pub pid: Option<u32>,
}

/// Numeric credentials of a process, in the order the kernel reports them
///
/// `uids` and `gids` are expected to hold real, effective, saved and
/// filesystem ids, but nothing here guarantees the length; consumers must
/// check before using them positionally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCredentials {
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    pub groups: Vec<u32>,
}
