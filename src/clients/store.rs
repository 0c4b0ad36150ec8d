use async_trait::async_trait;

use super::EtcdClient;
use crate::core::models::EtcdResponse;
use crate::core::options::WatchOptions;
use crate::errors::EtcdError;

/// Asynchronous key-value operations shared by store clients.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<EtcdResponse, EtcdError>;

    async fn set(&self, key: &str, value: &str) -> Result<EtcdResponse, EtcdError>;

    async fn delete(&self, key: &str) -> Result<EtcdResponse, EtcdError>;

    /// Resolves on the next change of `key`.
    async fn watch(&self, key: &str, options: &WatchOptions) -> Result<EtcdResponse, EtcdError>;
}

#[async_trait]
impl KeyValueStore for EtcdClient {
    async fn get(&self, key: &str) -> Result<EtcdResponse, EtcdError> {
        EtcdClient::get(self, key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<EtcdResponse, EtcdError> {
        EtcdClient::set(self, key, value).await
    }

    async fn delete(&self, key: &str) -> Result<EtcdResponse, EtcdError> {
        EtcdClient::delete(self, key).await
    }

    async fn watch(&self, key: &str, options: &WatchOptions) -> Result<EtcdResponse, EtcdError> {
        EtcdClient::watch(self, key, options).await
    }
}
