use std::fs;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use peercred_common::Resf;
use thiserror::Error;

use crate::core::domain::ProcessCredentials;
use crate::core::identity::{resolve_groups, NameResolver, ResolveError};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("process {0} no longer exists")]
    ProcessNotFound(u32),

    #[error("process {pid} reports {found} {kind} ids, expected 4")]
    MissingIds { pid: u32, kind: &'static str, found: usize },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("cannot read credentials of process {pid}: {source}")]
    Io { pid: u32, source: io::Error },

    #[error("malformed status of process {pid}: {reason}")]
    Malformed { pid: u32, reason: String },
}

/// Source of the numeric credentials of a live process
pub trait ProcessSource: Send + Sync {
    fn credentials(&self, pid: u32) -> Result<ProcessCredentials, CredentialError>;
}

/// Reads `<proc>/<pid>/status`
#[derive(Debug, Clone)]
pub struct ProcStatus {
    proc_root: PathBuf,
}

impl ProcStatus {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self { proc_root: proc_root.into() }
    }
}

impl ProcessSource for ProcStatus {
    fn credentials(&self, pid: u32) -> Result<ProcessCredentials, CredentialError> {
        let path = self.proc_root.join(pid.to_string()).join("status");
        let status = fs::read_to_string(&path).map_err(|e| {
            // ESRCH shows up when the task is reaped while we read
            if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(Errno::ESRCH as i32) {
                CredentialError::ProcessNotFound(pid)
            } else {
                CredentialError::Io { pid, source: e }
            }
        })?;
        parse_status(pid, &status)
    }
}

/// Pull the `Uid:`, `Gid:` and `Groups:` lines out of a status file
pub fn parse_status(pid: u32, status: &str) -> Result<ProcessCredentials, CredentialError> {
    let mut creds = ProcessCredentials::default();

    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key {
            "Uid" => &mut creds.uids,
            "Gid" => &mut creds.gids,
            "Groups" => &mut creds.groups,
            _ => continue,
        };
        *slot = value
            .split_whitespace()
            .map(|id| {
                id.parse::<u32>().map_err(|_| CredentialError::Malformed {
                    pid,
                    reason: format!("bad id {:?} in {} line", id, key),
                })
            })
            .collect::<Result<_, _>>()?;
    }

    Ok(creds)
}

/// Resolved credentials of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: Resf,
    pub groups: Resf,
    pub supplementary_groups: Vec<String>,
}

/// Turns a pid into named identities
pub struct CredentialExtractor<'a> {
    processes: &'a dyn ProcessSource,
    names: &'a dyn NameResolver,
}

impl<'a> CredentialExtractor<'a> {
    pub fn new(processes: &'a dyn ProcessSource, names: &'a dyn NameResolver) -> Self {
        Self { processes, names }
    }

    pub fn user_identity_set(&self, pid: u32) -> Result<Resf, CredentialError> {
        let creds = self.processes.credentials(pid)?;
        self.user_set(pid, &creds)
    }

    pub fn group_identity_set(&self, pid: u32) -> Result<Resf, CredentialError> {
        let creds = self.processes.credentials(pid)?;
        self.group_set(pid, &creds)
    }

    pub fn supplementary_groups(&self, pid: u32) -> Result<Vec<String>, CredentialError> {
        let creds = self.processes.credentials(pid)?;
        Ok(resolve_groups(self.names, &creds.groups)?)
    }

    /// All three sets from a single read of the process
    pub fn extract(&self, pid: u32) -> Result<Credentials, CredentialError> {
        let creds = self.processes.credentials(pid)?;
        Ok(Credentials {
            user: self.user_set(pid, &creds)?,
            groups: self.group_set(pid, &creds)?,
            supplementary_groups: resolve_groups(self.names, &creds.groups)?,
        })
    }

    fn user_set(&self, pid: u32, creds: &ProcessCredentials) -> Result<Resf, CredentialError> {
        build_resf(pid, "user", &creds.uids, |uid| self.names.resolve_user(uid))
    }

    fn group_set(&self, pid: u32, creds: &ProcessCredentials) -> Result<Resf, CredentialError> {
        build_resf(pid, "group", &creds.gids, |gid| self.names.resolve_group(gid))
    }
}

fn build_resf(
    pid: u32,
    kind: &'static str,
    ids: &[u32],
    resolve: impl Fn(u32) -> Result<String, ResolveError>,
) -> Result<Resf, CredentialError> {
    let &[real, effective, saved, filesystem, ..] = ids else {
        return Err(CredentialError::MissingIds { pid, kind, found: ids.len() });
    };

    Ok(Resf {
        real: resolve(real)?,
        effective: resolve(effective)?,
        saved: resolve(saved)?,
        filesystem: resolve(filesystem)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::identity::tests::StaticNames;
    use std::collections::HashMap;

    /// Process table held in memory
    #[derive(Default)]
    pub struct StaticProcesses {
        pub procs: HashMap<u32, ProcessCredentials>,
    }

    impl StaticProcesses {
        pub fn with(mut self, pid: u32, uids: &[u32], gids: &[u32], groups: &[u32]) -> Self {
            self.procs.insert(
                pid,
                ProcessCredentials {
                    uids: uids.to_vec(),
                    gids: gids.to_vec(),
                    groups: groups.to_vec(),
                },
            );
            self
        }
    }

    impl ProcessSource for StaticProcesses {
        fn credentials(&self, pid: u32) -> Result<ProcessCredentials, CredentialError> {
            self.procs.get(&pid).cloned().ok_or(CredentialError::ProcessNotFound(pid))
        }
    }

    const STATUS: &str = "Name:\tsshd\n\
        Umask:\t0022\n\
        State:\tS (sleeping)\n\
        Tgid:\t1234\n\
        Pid:\t1234\n\
        PPid:\t1\n\
        Uid:\t1000\t0\t0\t0\n\
        Gid:\t1000\t1000\t1000\t1000\n\
        FDSize:\t64\n\
        Groups:\t4 27 100 \n\
        NStgid:\t1234\n";

    fn names() -> StaticNames {
        StaticNames::new()
            .user(0, "root")
            .user(1000, "alice")
            .group(1000, "alice")
            .group(4, "adm")
            .group(27, "sudo")
            .group(100, "users")
    }

    #[test]
    fn test_parse_status() {
        let creds = parse_status(1234, STATUS).unwrap();
        assert_eq!(creds.uids, vec![1000, 0, 0, 0]);
        assert_eq!(creds.gids, vec![1000, 1000, 1000, 1000]);
        assert_eq!(creds.groups, vec![4, 27, 100]);
    }

    #[test]
    fn test_parse_status_empty_groups() {
        let creds = parse_status(1, "Uid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\nGroups:\t\n").unwrap();
        assert!(creds.groups.is_empty());
    }

    #[test]
    fn test_parse_status_bad_id() {
        let result = parse_status(1, "Uid:\t0\tzero\t0\t0\n");
        assert!(matches!(result, Err(CredentialError::Malformed { pid: 1, .. })));
    }

    #[test]
    fn test_proc_status_reads_fixture() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("1234")).unwrap();
        fs::write(root.path().join("1234/status"), STATUS).unwrap();

        let source = ProcStatus::new(root.path());
        assert_eq!(source.credentials(1234).unwrap().uids, vec![1000, 0, 0, 0]);
        assert!(matches!(source.credentials(4321), Err(CredentialError::ProcessNotFound(4321))));
    }

    #[test]
    fn test_identity_set_order_is_fixed() {
        let procs = StaticProcesses::default().with(1234, &[1000, 0, 0, 0], &[1000, 1000, 1000, 1000], &[]);
        let names = names();
        let extractor = CredentialExtractor::new(&procs, &names);

        let user = extractor.user_identity_set(1234).unwrap();
        assert_eq!(user.real, "alice");
        assert_eq!(user.effective, "root");
        assert_eq!(user.saved, "root");
        assert_eq!(user.filesystem, "root");
    }

    #[test]
    fn test_short_id_list_fails() {
        let procs = StaticProcesses::default().with(7, &[1000, 1000], &[1000, 1000, 1000], &[]);
        let names = names();
        let extractor = CredentialExtractor::new(&procs, &names);

        assert!(matches!(
            extractor.user_identity_set(7),
            Err(CredentialError::MissingIds { kind: "user", found: 2, .. })
        ));
        assert!(matches!(
            extractor.group_identity_set(7),
            Err(CredentialError::MissingIds { kind: "group", found: 3, .. })
        ));
    }

    #[test]
    fn test_one_unresolved_uid_fails_whole_set() {
        let procs = StaticProcesses::default().with(9, &[1000, 1000, 1000, 5555], &[1000, 1000, 1000, 1000], &[]);
        let names = names();
        let extractor = CredentialExtractor::new(&procs, &names);

        assert!(matches!(
            extractor.user_identity_set(9),
            Err(CredentialError::Resolve(ResolveError::UserNotFound(5555)))
        ));
        assert!(extractor.extract(9).is_err());
    }

    #[test]
    fn test_supplementary_groups() {
        let procs = StaticProcesses::default()
            .with(1, &[1000; 4], &[1000; 4], &[100, 4, 27])
            .with(2, &[1000; 4], &[1000; 4], &[])
            .with(3, &[1000; 4], &[1000; 4], &[4, 31337]);
        let names = names();
        let extractor = CredentialExtractor::new(&procs, &names);

        assert_eq!(extractor.supplementary_groups(1).unwrap(), vec!["users", "adm", "sudo"]);
        assert!(extractor.supplementary_groups(2).unwrap().is_empty());
        assert!(extractor.supplementary_groups(3).is_err());
    }

    #[test]
    fn test_extract_vanished_process() {
        let procs = StaticProcesses::default();
        let names = names();
        let extractor = CredentialExtractor::new(&procs, &names);

        assert!(matches!(extractor.extract(1234), Err(CredentialError::ProcessNotFound(1234))));
    }
}
