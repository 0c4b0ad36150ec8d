// Smoke test against a running cluster: one blocking read, printed as-is.

use etcdv2::utils::wait::{DEFAULT_AWAIT_TIMEOUT, await_result};
use etcdv2::{ClientConfig, EtcdClient};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    etcdv2::setup_logging();

    let config = ClientConfig::from_env()?;
    let key = std::env::var("ETCD_SMOKE_KEY").unwrap_or_else(|_| "test4".to_string());
    let client = EtcdClient::from_config(&config)?;

    info!("Reading {} from {}", key, client.active_endpoint());

    match await_result(client.get(&key), DEFAULT_AWAIT_TIMEOUT) {
        Ok(response) => {
            println!("{response:?}");
            Ok(())
        }
        Err(e) => {
            error!("Smoke read of {} failed: {}", key, e);
            Err(e.into())
        }
    }
}
