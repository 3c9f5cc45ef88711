//! In-memory store implementations
//!
//! Used for testing and for instances that should not share state with
//! other processes.

use anyhow::Result;
use std::sync::{PoisonError, RwLock};

use super::{FlagStore, RefreshFlag, SessionStore};
use crate::models::Session;

/// In-memory implementation of FlagStore
#[derive(Default)]
pub struct InMemoryFlagStore {
    flag: RwLock<Option<RefreshFlag>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for InMemoryFlagStore {
    fn read(&self) -> Result<Option<RefreshFlag>> {
        Ok(*self.flag.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, flag: RefreshFlag) -> Result<()> {
        *self.flag.write().unwrap_or_else(PoisonError::into_inner) = Some(flag);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.flag.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// In-memory implementation of SessionStore
#[derive(Default)]
pub struct InMemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a signed-in user
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn current(&self) -> Result<Option<Session>> {
        Ok(self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, session: &Session) -> Result<()> {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
