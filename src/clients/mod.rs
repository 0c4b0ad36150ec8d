//! Client modules for the key-value store

pub mod etcd_client;
pub mod store;
mod watch;

pub use etcd_client::EtcdClient;
pub use store::KeyValueStore;
