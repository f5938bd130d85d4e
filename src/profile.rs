use crate::error::Result;
use crate::types::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Off-ledger participant profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub wallet_address: String,
    pub name: String,
    pub location: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(
        wallet_address: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            name: name.into(),
            location: location.into(),
            role,
            created_at: None,
        }
    }
}

/// Profile lookup keyed by wallet identity
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, identity: &str) -> Result<Option<UserProfile>>;
    async fn put(&self, profile: UserProfile) -> Result<()>;
}

/// Profile store held in memory. Identities compare case-insensitively.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, identity: &str) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&identity.to_lowercase()).cloned())
    }

    async fn put(&self, mut profile: UserProfile) -> Result<()> {
        if profile.created_at.is_none() {
            profile.created_at = Some(Utc::now());
        }
        let key = profile.wallet_address.to_lowercase();
        self.profiles.write().await.insert(key, profile);
        Ok(())
    }
}
