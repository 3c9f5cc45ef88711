//! Authenticated session identity

use serde::{Deserialize, Serialize};

/// The signed-in user a history view belongs to.
///
/// Anonymous use is represented by `Option<Session>::None`; no fetch is ever
/// made without a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username, used to address the history list endpoint
    pub username: String,
    /// Server-side user id, when the login response carried one
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Session {
    /// Create a session for a username.
    ///
    /// Returns `None` for a blank username, which is treated as anonymous.
    pub fn new(username: impl Into<String>) -> Option<Self> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username,
            user_id: None,
        })
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
