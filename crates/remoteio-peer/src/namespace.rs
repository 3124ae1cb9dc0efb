use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use remoteio_frame::Op;
use remoteio_transport::{Channel, Status};
use tracing::debug;

use crate::error::{Result, RioError};
use crate::handshake::{connect, OpenFlags, SERVICE_MODE};

/// Path-based connect for callers that have no directory handle.
pub trait Namespace: Send + Sync {
    /// Attach `channel` to the object at the absolute `path`. The channel is
    /// consumed on every path.
    fn connect(&self, path: &str, flags: OpenFlags, channel: Channel) -> Result<()>;
}

/// A namespace built from absolute prefixes bound to directory channels.
/// The longest prefix matching at a component boundary wins.
#[derive(Debug, Default)]
pub struct PrefixNamespace {
    entries: RwLock<BTreeMap<String, Channel>>,
}

fn normalize(prefix: &str) -> Option<String> {
    if !prefix.starts_with('/') {
        return None;
    }
    let trimmed = prefix.trim_end_matches('/');
    Some(if trimmed.is_empty() { "/".to_owned() } else { trimmed.to_owned() })
}

/// Remainder of `path` under `prefix`, or `None` if it is not below it.
fn strip<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = if prefix == "/" {
        path.strip_prefix('/')?
    } else {
        let rest = path.strip_prefix(prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        rest.trim_start_matches('/')
    };
    Some(if rest.is_empty() { "." } else { rest })
}

impl PrefixNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `dir` at the absolute `prefix`.
    pub fn bind(&self, prefix: &str, dir: Channel) -> Result<()> {
        let prefix = normalize(prefix).ok_or(RioError::InvalidArgs("namespace prefix must be absolute"))?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&prefix) {
            return Err(RioError::Transport(Status::ALREADY_EXISTS));
        }
        debug!(prefix, "namespace bind");
        entries.insert(prefix, dir);
        Ok(())
    }

    /// Remove and return the directory bound at `prefix`.
    pub fn unbind(&self, prefix: &str) -> Option<Channel> {
        let prefix = normalize(prefix)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&prefix)
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Namespace for PrefixNamespace {
    fn connect(&self, path: &str, flags: OpenFlags, channel: Channel) -> Result<()> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries
            .iter()
            .filter_map(|(prefix, dir)| strip(prefix, path).map(|rest| (prefix.len(), rest, dir)))
            .max_by_key(|(len, _, _)| *len);
        let Some((_, rest, dir)) = found else {
            debug!(path, "no namespace entry");
            return Err(RioError::NotFound("no namespace entry for path"));
        };
        connect(dir, channel, Op::Open, flags, SERVICE_MODE, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remoteio_frame::read_message;
    use remoteio_transport::HandleTable;

    #[test]
    fn strip_respects_component_boundaries() {
        assert_eq!(strip("/svc", "/svc/echo"), Some("echo"));
        assert_eq!(strip("/svc", "/svc"), Some("."));
        assert_eq!(strip("/svc", "/svcx/echo"), None);
        assert_eq!(strip("/", "/data/a"), Some("data/a"));
        assert_eq!(strip("/", "relative"), None);
    }

    #[test]
    fn longest_prefix_receives_the_open() {
        let table = HandleTable::new();
        let ns = PrefixNamespace::new();
        let (root, root_srv) = Channel::create(&table);
        let (svc, svc_srv) = Channel::create(&table);
        ns.bind("/", root).expect("bind root");
        ns.bind("/svc/", svc).expect("bind svc");
        assert_eq!(ns.prefixes(), vec!["/".to_owned(), "/svc".to_owned()]);

        let (client, server_end) = Channel::create(&table);
        ns.connect("/svc/echo", OpenFlags::RIGHT_READABLE, server_end)
            .expect("connect");
        let msg = read_message(&svc_srv).expect("open request");
        assert_eq!(msg.header.op, Op::Open.raw());
        assert_eq!(msg.data().as_ref(), b"echo");
        assert_eq!(msg.header.mode(), SERVICE_MODE);
        assert_eq!(msg.handles().len(), 1);
        assert!(read_message(&root_srv).is_err());
        drop(client);
    }

    #[test]
    fn unmatched_path_is_not_found_and_closes_channel() {
        let table = HandleTable::new();
        let ns = PrefixNamespace::new();
        let (svc, _svc_srv) = Channel::create(&table);
        ns.bind("/svc", svc).expect("bind");
        let before = table.open_count();
        let (_client, server_end) = Channel::create(&table);
        let err = ns.connect("/data", OpenFlags::RIGHT_READABLE, server_end).unwrap_err();
        assert_eq!(err.status(), Status::NOT_FOUND);
        assert_eq!(table.open_count(), before + 1);
    }

    #[test]
    fn bind_rejects_relative_and_duplicate_prefixes() {
        let table = HandleTable::new();
        let ns = PrefixNamespace::new();
        let (a, _a) = Channel::create(&table);
        let (b, _b) = Channel::create(&table);
        let (c, _c) = Channel::create(&table);
        assert!(matches!(ns.bind("svc", a), Err(RioError::InvalidArgs(_))));
        ns.bind("/svc", b).expect("bind");
        assert_eq!(ns.bind("/svc/", c).unwrap_err().status(), Status::ALREADY_EXISTS);
        assert!(ns.unbind("/svc").is_some());
        assert!(ns.prefixes().is_empty());
    }
}
