pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;

/// Keys used in durable storage for session persistence.
///
/// Names match the backend's existing mobile clients so a stored session
/// survives an app upgrade.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER_INFO: &str = "userInfo";
    pub const REMEMBER_ME: &str = "remember_me";
}

/// Durable string key-value storage backing "remember me" persistence.
///
/// Implementations wrap whatever the host platform provides (keychain,
/// preferences file). [`memory::MemoryStorage`] is the in-process
/// implementation used by tests.
#[async_trait]
pub trait DurableStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}
