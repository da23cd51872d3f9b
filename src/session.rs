use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use crate::store::{Role, UserRecord};

/// Default session lifetime.
pub const SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime when the user asked to be remembered.
pub const REMEMBER_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Server-side state behind a `sessionId` cookie
#[derive(Clone, Debug)]
pub struct Session {
    /// Id of the logged-in user
    pub user_id: u64,

    /// Login name, refreshed when the profile changes
    pub login: String,

    /// Display name, refreshed when the profile changes
    pub name: String,

    /// Role at login time
    pub role: Role,

    /// When this session stops being valid
    pub expires_at: SystemTime,
}

impl Session {
    pub fn for_user(user: &UserRecord, lifetime: Duration) -> Self {
        Session {
            user_id: user.id,
            login: user.login.clone(),
            name: user.name.clone(),
            role: user.role,
            expires_at: SystemTime::now() + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= SystemTime::now()
    }
}

/// Where logged-in sessions live. Expired sessions are never returned.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Session>;
    fn set(&self, id: String, session: Session);
    /// Forget a session, returning it if it was still live.
    fn expire(&self, id: &str) -> Option<Session>;
}

/// Process-local sessions; lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        {
            let sessions = self.sessions.read().ok()?;
            match sessions.get(id) {
                Some(session) if !session.is_expired() => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it.
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(id);
        }
        None
    }

    fn set(&self, id: String, session: Session) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(id, session);
        }
    }

    fn expire(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().ok()?;
        sessions.remove(id).filter(|s| !s.is_expired())
    }
}
