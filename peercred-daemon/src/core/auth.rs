use peercred_common::MAX_PRIVILEGED_PORT;

/// Outcome of the source port check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject,
}

/// Admit a caller only if it connected from a port an unprivileged
/// process cannot bind.
///
/// The port is taken from the accepted TCP connection. Nothing in the
/// request body is consulted, so a caller that passes this check may ask
/// about any connection on the host.
pub fn authorize(source_port: u16) -> Decision {
    if source_port <= MAX_PRIVILEGED_PORT {
        Decision::Admit
    } else {
        Decision::Reject
    }
}
