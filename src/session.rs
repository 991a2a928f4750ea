//! Reviewer identities and per-session state
//!
//! Every browser session gets its own [`SessionContext`]: the selected
//! identity plus a private [`MetricsCache`]. Sessions never share tables.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::MetricsCache;
use crate::config::PortalConfig;
use crate::errors::{PortalError, Result};

/// What an identity may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Browse only
    Viewer,
    /// Browse and submit feedback
    Reviewer,
}

/// The selected reviewer or viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    name: String,
    role: Role,
}

impl Identity {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn can_review(&self) -> bool {
        self.role == Role::Reviewer
    }
}

/// Selectable identities, viewers first
#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new(viewers: &[String], reviewers: &[String]) -> Self {
        let identities = viewers
            .iter()
            .map(|name| Identity::new(name.clone(), Role::Viewer))
            .chain(
                reviewers
                    .iter()
                    .filter(|name| !viewers.contains(*name))
                    .map(|name| Identity::new(name.clone(), Role::Reviewer)),
            )
            .collect();
        Self { identities }
    }

    pub fn from_config(config: &PortalConfig) -> Self {
        Self::new(&config.viewers, &config.reviewers)
    }

    #[cfg(test)]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn find(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    /// First entry of the roster; the default for new sessions.
    pub fn default_identity(&self) -> Option<&Identity> {
        self.identities.first()
    }
}

/// State for one browser session
pub struct SessionContext {
    id: Uuid,
    identity: RwLock<Identity>,
    cache: MetricsCache,
    last_seen: Mutex<Instant>,
}

impl SessionContext {
    pub fn new(id: Uuid, identity: Identity) -> Self {
        let cache = MetricsCache::new();
        cache.set_owner(&identity);
        Self {
            id,
            identity: RwLock::new(identity),
            cache,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn last_seen(&self) -> Instant {
        *self
            .last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(&self, now: Instant) {
        *self
            .last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    fn expired(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_seen()) >= idle
    }

    pub fn identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.cache
    }

    /// Switch identity. Cached tables are dropped when it actually changes.
    ///
    /// Returns whether the identity changed.
    pub fn set_identity(&self, name: &str, roster: &Roster) -> Result<bool> {
        let next = roster
            .find(name)
            .cloned()
            .ok_or_else(|| PortalError::InvalidRequest(format!("Unknown identity: {}", name)))?;

        let mut current = self
            .identity
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current == next {
            return Ok(false);
        }
        info!(session = %self.id, from = %current.name(), to = %next.name(), "Identity changed");
        self.cache.set_owner(&next);
        *current = next;
        Ok(true)
    }
}

/// How long sessions live and how many may exist at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub idle: Duration,
    pub max_sessions: usize,
}

impl SessionLimits {
    pub fn from_config(config: &PortalConfig) -> Self {
        Self {
            idle: Duration::from_secs(config.session_idle_secs),
            max_sessions: config.max_sessions.max(1),
        }
    }
}

/// All live sessions
pub struct SessionStore {
    roster: Roster,
    limits: SessionLimits,
    sessions: RwLock<HashMap<Uuid, Arc<SessionContext>>>,
}

impl SessionStore {
    pub fn new(roster: Roster, limits: SessionLimits) -> Self {
        Self {
            roster,
            limits,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PortalConfig) -> Self {
        Self::new(Roster::from_config(config), SessionLimits::from_config(config))
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Look up a session, creating a fresh one for missing, unknown or
    /// expired ids.
    ///
    /// The flag is true when a new session was created.
    pub fn get_or_create(&self, id: Option<Uuid>) -> Result<(Arc<SessionContext>, bool)> {
        let now = Instant::now();
        if let Some(id) = id {
            let sessions = self
                .sessions
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(session) = sessions.get(&id) {
                if !session.expired(now, self.limits.idle) {
                    session.touch(now);
                    return Ok((session.clone(), false));
                }
            }
        }

        let identity = self
            .roster
            .default_identity()
            .cloned()
            .ok_or_else(|| PortalError::Config("identity roster is empty".to_string()))?;
        let session = Arc::new(SessionContext::new(Uuid::new_v4(), identity));

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.evict(&mut sessions, now);
        sessions.insert(session.id(), session.clone());
        info!(session = %session.id(), live = sessions.len(), "Session created");
        Ok((session, true))
    }

    /// Drop expired sessions, then the least recently used ones until there
    /// is room for one more.
    fn evict(&self, sessions: &mut HashMap<Uuid, Arc<SessionContext>>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, session| !session.expired(now, self.limits.idle));

        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen())
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "Sessions evicted");
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
