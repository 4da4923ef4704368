use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::connections::{ConnectionTable, ProcNetTable};
use crate::core::identity::{NameResolver, SystemNames};
use crate::core::process::{ProcStatus, ProcessSource};

/// Handles shared by every request. Read-only; each query only reads
/// host tables through them.
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<dyn ConnectionTable>,
    pub processes: Arc<dyn ProcessSource>,
    pub names: Arc<dyn NameResolver>,
    pub lookup_timeout: Duration,
}

impl AppState {
    pub fn new(
        connections: Arc<dyn ConnectionTable>,
        processes: Arc<dyn ProcessSource>,
        names: Arc<dyn NameResolver>,
        lookup_timeout: Duration,
    ) -> Self {
        Self { connections, processes, names, lookup_timeout }
    }

    /// State backed by procfs and the system user/group databases
    pub fn host(proc_root: &Path, lookup_timeout: Duration) -> Self {
        Self::new(
            Arc::new(ProcNetTable::new(proc_root)),
            Arc::new(ProcStatus::new(proc_root)),
            Arc::new(SystemNames),
            lookup_timeout,
        )
    }
}
