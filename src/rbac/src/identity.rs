//! User directory collaborator
//!
//! Users are owned by the platform's authentication system. The engine only
//! asks whether an identifier refers to a known user before binding roles to it.

use async_trait::async_trait;
use dashmap::DashSet;

use crate::error::Result;
use crate::types::UserId;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool>;
}

/// Accepts every non-blank identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

#[async_trait]
impl UserDirectory for OpenDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        Ok(!user_id.trim().is_empty())
    }
}

/// Fixed set of known users, for tests and single-node deployments
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: DashSet<UserId>,
}

impl StaticDirectory {
    pub fn new<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_user(&self, user_id: impl Into<UserId>) {
        self.users.insert(user_id.into());
    }

    pub fn remove_user(&self, user_id: &str) {
        self.users.remove(user_id);
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        Ok(self.users.contains(user_id))
    }
}
