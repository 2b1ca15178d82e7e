//! Session Store: parked multi-result detections awaiting a selection.
//!
//! A session is consumed by exactly one successful [`SessionStore::complete`].
//! Validation and removal happen in a single `DashMap::remove_if`, so two
//! concurrent completions of the same token cannot both succeed.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use rand::RngCore;
use tokio::time::Instant;

use crate::error::SessionError;
use crate::registry::RegistrySnapshot;
use crate::sandbox::Input;
use crate::translator::Translator;

const TOKEN_BYTES: usize = 32;

/// A multi-result detection waiting for the caller to choose.
#[derive(Debug, Clone)]
pub struct Session {
    pub translator: Arc<Translator>,
    /// The registry snapshot the session was opened under; completion runs
    /// against it even if the registry has been reloaded since.
    pub snapshot: Arc<RegistrySnapshot>,
    pub input: Input,
    /// Candidate id -> title, in the order the translator offered them.
    pub pending: IndexMap<String, String>,
    created: Instant,
}

impl Session {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// What a successful completion hands to the resolver.
#[derive(Debug, Clone)]
pub struct Completion {
    pub session: Session,
    /// The selected ids, de-duplicated, in request order.
    pub selected: Vec<String>,
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Park a selection and return its token. Also sweeps expired sessions.
    pub fn open(
        &self,
        translator: Arc<Translator>,
        snapshot: Arc<RegistrySnapshot>,
        input: Input,
        pending: IndexMap<String, String>,
    ) -> String {
        self.sweep();

        let session = Session {
            translator,
            snapshot,
            input,
            pending,
            created: Instant::now(),
        };
        loop {
            let token = new_token();
            if let Entry::Vacant(slot) = self.sessions.entry(token.clone()) {
                tracing::debug!(
                    translator = %session.translator.id,
                    candidates = session.pending.len(),
                    "session opened"
                );
                slot.insert(session);
                return token;
            }
        }
    }

    /// Look at a session without consuming it.
    pub fn get(&self, token: &str) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .get(token)
            .map(|s| s.value().clone())
            .ok_or(SessionError::NotFound)?;
        if session.age() >= self.ttl {
            self.sessions.remove(token);
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    /// Validate `selected` against the pending map and consume the session.
    ///
    /// On an invalid selection the session stays in place for a retry.
    pub fn complete(&self, token: &str, selected: &[String]) -> Result<Completion, SessionError> {
        let ttl = self.ttl;
        let removed = self.sessions.remove_if(token, |_, session| {
            session.age() < ttl && check_selection(session, selected).is_ok()
        });
        if let Some((_, session)) = removed {
            tracing::debug!(
                translator = %session.translator.id,
                selected = selected.len(),
                "session completed"
            );
            return Ok(Completion {
                session,
                selected: dedup(selected),
            });
        }

        let Some(session) = self.sessions.get(token).map(|s| s.value().clone()) else {
            return Err(SessionError::NotFound);
        };
        if session.age() >= ttl {
            self.sessions.remove(token);
            tracing::debug!(translator = %session.translator.id, "session expired");
            return Err(SessionError::Expired);
        }
        Err(check_selection(&session, selected)
            .err()
            .unwrap_or_else(|| SessionError::InvalidSelection("selection rejected".into())))
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.age() < self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
        removed
    }
}

fn check_selection(session: &Session, selected: &[String]) -> Result<(), SessionError> {
    if selected.is_empty() {
        return Err(SessionError::InvalidSelection("no items selected".into()));
    }
    match selected.iter().find(|id| !session.pending.contains_key(*id)) {
        Some(unknown) => Err(SessionError::InvalidSelection(format!(
            "'{}' is not one of the offered items",
            unknown
        ))),
        None => Ok(()),
    }
}

fn dedup(selected: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(selected.len());
    for id in selected {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// 256 bits from the OS generator, URL-safe base64 without padding.
fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
