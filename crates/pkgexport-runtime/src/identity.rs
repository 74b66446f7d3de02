//! Resolution and assumption of the OS identity the export tool runs as.

use crate::RuntimeError;
use nix::unistd::{getegid, geteuid, setgid, setgroups, setuid, Gid, Group, Uid, User};
use pkgexport_schema::IdentityConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl TargetIdentity {
    /// The effective identity of the calling process.
    pub fn current() -> Self {
        Self {
            uid: geteuid().as_raw(),
            gid: getegid().as_raw(),
        }
    }

    pub fn is_current(&self) -> bool {
        *self == Self::current()
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={} gid={}", self.uid, self.gid)
    }
}

/// Map configured user/group names or numeric ids onto a [`TargetIdentity`].
///
/// An unset user or group keeps the current one, except that a configured
/// user without a group gets that user's primary group. Numeric user ids are
/// accepted without a passwd entry.
pub fn resolve_identity(config: &IdentityConfig) -> Result<TargetIdentity, RuntimeError> {
    let current = TargetIdentity::current();

    let (uid, primary_gid) = match config.user.as_deref() {
        None => (current.uid, None),
        Some(user) => resolve_user(user)?,
    };

    let gid = match config.group.as_deref() {
        Some(group) => resolve_group(group)?,
        None => primary_gid.unwrap_or(current.gid),
    };

    let target = TargetIdentity { uid, gid };
    debug!("resolved export identity {target}");
    Ok(target)
}

fn resolve_user(user: &str) -> Result<(u32, Option<u32>), RuntimeError> {
    if let Ok(uid) = user.parse::<u32>() {
        let entry = User::from_uid(Uid::from_raw(uid))
            .map_err(|e| RuntimeError::Identity(format!("looking up uid {uid}: {e}")))?;
        return Ok((uid, entry.map(|u| u.gid.as_raw())));
    }
    let entry = User::from_name(user)
        .map_err(|e| RuntimeError::Identity(format!("looking up user '{user}': {e}")))?
        .ok_or_else(|| RuntimeError::UnknownUser(user.to_owned()))?;
    Ok((entry.uid.as_raw(), Some(entry.gid.as_raw())))
}

fn resolve_group(group: &str) -> Result<u32, RuntimeError> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    let entry = Group::from_name(group)
        .map_err(|e| RuntimeError::Identity(format!("looking up group '{group}': {e}")))?
        .ok_or_else(|| RuntimeError::UnknownGroup(group.to_owned()))?;
    Ok(entry.gid.as_raw())
}

/// Switch the calling process to `target`: group first, then user. Each step
/// is skipped when the process already has that id. When running as root and
/// either id changes, the supplementary groups are reduced to the target gid.
pub fn switch_identity(target: &TargetIdentity) -> nix::Result<()> {
    let gid = Gid::from_raw(target.gid);
    let uid = Uid::from_raw(target.uid);

    if geteuid().is_root() && (geteuid() != uid || getegid() != gid) {
        setgroups(&[gid])?;
    }
    if getegid() != gid {
        setgid(gid)?;
    }
    if geteuid() != uid {
        setuid(uid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_config_resolves_to_current() {
        let target = resolve_identity(&IdentityConfig::default()).unwrap();
        assert_eq!(target, TargetIdentity::current());
        assert!(target.is_current());
    }

    #[test]
    fn numeric_ids_resolve_directly() {
        let config = IdentityConfig::new(Some("4242424".into()), Some("4242425".into()));
        let target = resolve_identity(&config).unwrap();
        assert_eq!(target, TargetIdentity { uid: 4_242_424, gid: 4_242_425 });
    }

    #[test]
    fn numeric_user_without_entry_keeps_current_group() {
        let config = IdentityConfig::new(Some("4242424".into()), None);
        let target = resolve_identity(&config).unwrap();
        assert_eq!(target.uid, 4_242_424);
        assert_eq!(target.gid, TargetIdentity::current().gid);
    }

    #[test]
    fn root_user_gets_primary_group() {
        let config = IdentityConfig::new(Some("root".into()), None);
        let target = resolve_identity(&config).unwrap();
        assert_eq!(target, TargetIdentity { uid: 0, gid: 0 });
    }

    #[test]
    fn unknown_user_is_rejected() {
        let config = IdentityConfig::new(Some("pkgexport-no-such-user".into()), None);
        assert!(matches!(
            resolve_identity(&config),
            Err(RuntimeError::UnknownUser(name)) if name == "pkgexport-no-such-user"
        ));
    }

    #[test]
    fn unknown_group_is_rejected() {
        let config = IdentityConfig::new(None, Some("pkgexport-no-such-group".into()));
        assert!(matches!(
            resolve_identity(&config),
            Err(RuntimeError::UnknownGroup(_))
        ));
    }

    #[test]
    fn switching_to_current_identity_is_a_no_op() {
        switch_identity(&TargetIdentity::current()).unwrap();
    }

    #[test]
    fn display_lists_ids() {
        let target = TargetIdentity { uid: 1000, gid: 100 };
        assert_eq!(target.to_string(), "uid=1000 gid=100");
    }
}
