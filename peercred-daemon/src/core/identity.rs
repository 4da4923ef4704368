use nix::unistd::{Gid, Group, Uid, User};
use thiserror::Error;

/// Failure to turn a numeric id into a name
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no user entry for uid {0}")]
    UserNotFound(u32),

    #[error("no group entry for gid {0}")]
    GroupNotFound(u32),

    #[error("identity database lookup failed: {0}")]
    Database(#[from] nix::Error),
}

/// Maps numeric user and group ids to their names
pub trait NameResolver: Send + Sync {
    fn resolve_user(&self, uid: u32) -> Result<String, ResolveError>;
    fn resolve_group(&self, gid: u32) -> Result<String, ResolveError>;
}

/// Resolver backed by the host's passwd/group databases (NSS)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNames;

impl NameResolver for SystemNames {
    fn resolve_user(&self, uid: u32) -> Result<String, ResolveError> {
        match User::from_uid(Uid::from_raw(uid))? {
            Some(user) => Ok(user.name),
            None => Err(ResolveError::UserNotFound(uid)),
        }
    }

    fn resolve_group(&self, gid: u32) -> Result<String, ResolveError> {
        match Group::from_gid(Gid::from_raw(gid))? {
            Some(group) => Ok(group.name),
            None => Err(ResolveError::GroupNotFound(gid)),
        }
    }
}

/// Resolve every gid in order, failing on the first one without a name
pub fn resolve_groups(names: &dyn NameResolver, gids: &[u32]) -> Result<Vec<String>, ResolveError> {
    gids.iter().map(|&gid| names.resolve_group(gid)).collect()
}
