//! TTL-bounded session store.
//!
//! Three maps behind one reader-writer lock: active sessions, the
//! validated-session fast-path flags, and the in-flight upload guards.
//! Entries carry explicit deadlines and are swept lazily on access; every
//! touch of a live key slides its deadline forward. No lock is held
//! across I/O — callers copy what they need out.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use lanbeam_core::{Error, Result};
use lanbeam_proto::FileInfo;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// State recorded for one accepted prepare-upload.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Files still pending; completed uploads are removed.
    pub files: HashMap<String, FileInfo>,
    /// Per-file upload tokens.
    pub tokens: HashMap<String, String>,
    pub sender_fingerprint: String,
    pub sender_address: IpAddr,
}

struct StoredSession {
    entry: SessionEntry,
    deadline: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, StoredSession>,
    validated: HashMap<String, Instant>,
    in_flight: HashSet<(String, String)>,
}

pub struct SessionStore {
    ttl: Duration,
    inner: RwLock<Inner>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn insert(&self, session_id: &str, entry: SessionEntry) {
        let mut inner = self.inner.write();
        let deadline = Instant::now() + self.ttl;
        inner
            .sessions
            .insert(session_id.to_string(), StoredSession { entry, deadline });
    }

    /// Whether the session is live; refreshes its deadline.
    pub fn session_exists(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write();
        let now = Instant::now();
        sweep(&mut inner, now);
        match inner.sessions.get_mut(session_id) {
            Some(stored) => {
                stored.deadline = now + self.ttl;
                true
            }
            None => false,
        }
    }

    pub fn is_validated(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write();
        let now = Instant::now();
        sweep(&mut inner, now);
        match inner.validated.get_mut(session_id) {
            Some(deadline) => {
                *deadline = now + self.ttl;
                true
            }
            None => false,
        }
    }

    pub fn mark_validated(&self, session_id: &str) {
        let mut inner = self.inner.write();
        let deadline = Instant::now() + self.ttl;
        inner.validated.insert(session_id.to_string(), deadline);
    }

    /// Whether any live session was opened by this fingerprint.
    pub fn has_active_for(&self, fingerprint: &str) -> bool {
        let mut inner = self.inner.write();
        sweep(&mut inner, Instant::now());
        inner
            .sessions
            .values()
            .any(|s| s.entry.sender_fingerprint == fingerprint)
    }

    pub fn active_count(&self) -> usize {
        let mut inner = self.inner.write();
        sweep(&mut inner, Instant::now());
        inner.sessions.len()
    }

    /// Validate one upload and mark the `(session, file)` pair in flight.
    ///
    /// Checks in protocol order: live session, token match, sender
    /// address (when enforced), no concurrent upload of the same file.
    /// Returns the file's metadata for the sink.
    pub fn begin_upload(
        &self,
        session_id: &str,
        file_id: &str,
        token: &str,
        remote: IpAddr,
        check_sender_ip: bool,
    ) -> Result<FileInfo> {
        let mut inner = self.inner.write();
        let now = Instant::now();
        sweep(&mut inner, now);

        let ttl = self.ttl;
        let stored = inner
            .sessions
            .get_mut(session_id)
            .ok_or(Error::UnknownSession)?;
        stored.deadline = now + ttl;

        match stored.entry.tokens.get(file_id) {
            Some(expected) if expected == token => {}
            _ => return Err(Error::InvalidToken),
        }
        if check_sender_ip && stored.entry.sender_address != remote {
            return Err(Error::InvalidToken);
        }
        let info = stored
            .entry
            .files
            .get(file_id)
            .cloned()
            .ok_or(Error::InvalidToken)?;

        let key = (session_id.to_string(), file_id.to_string());
        if !inner.in_flight.insert(key) {
            return Err(Error::UploadInFlight);
        }
        Ok(info)
    }

    /// Record a completed upload. Returns true when it was the session's
    /// last pending file, in which case the session is destroyed.
    pub fn finish_upload(&self, session_id: &str, file_id: &str) -> bool {
        let mut inner = self.inner.write();
        inner
            .in_flight
            .remove(&(session_id.to_string(), file_id.to_string()));
        let complete = match inner.sessions.get_mut(session_id) {
            Some(stored) => {
                stored.entry.files.remove(file_id);
                stored.entry.tokens.remove(file_id);
                stored.entry.files.is_empty()
            }
            None => false,
        };
        if complete {
            destroy_locked(&mut inner, session_id);
        }
        complete
    }

    /// Release the in-flight guard after a failed upload; the session and
    /// the file's token stay live so the sender may retry.
    pub fn abort_upload(&self, session_id: &str, file_id: &str) {
        let mut inner = self.inner.write();
        inner
            .in_flight
            .remove(&(session_id.to_string(), file_id.to_string()));
    }

    /// Remove the session across all maps atomically.
    pub fn destroy(&self, session_id: &str) {
        let mut inner = self.inner.write();
        destroy_locked(&mut inner, session_id);
    }
}

fn destroy_locked(inner: &mut Inner, session_id: &str) {
    inner.sessions.remove(session_id);
    inner.validated.remove(session_id);
    inner.in_flight.retain(|(sid, _)| sid != session_id);
}

fn sweep(inner: &mut Inner, now: Instant) {
    let expired: Vec<String> = inner
        .sessions
        .iter()
        .filter(|(_, s)| s.deadline <= now)
        .map(|(id, _)| id.clone())
        .collect();
    for id in expired {
        destroy_locked(inner, &id);
    }
    inner.validated.retain(|_, deadline| *deadline > now);
}
