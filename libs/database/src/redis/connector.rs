use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use super::RedisConfig;
use crate::common::{FIRST_WAIT, next_wait, smear};

/// Open a managed connection and prove it with a PING. One attempt.
///
/// The returned `ConnectionManager` reconnects on its own after transient
/// drops, so it is cloned freely and held for the process lifetime; this
/// retry loop only covers the initial connect.
pub async fn connect(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(config.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;

    let _: String = redis::cmd("PING")
        .query_async(&mut manager.clone())
        .await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect, retrying with doubling smeared waits until the config's
/// attempt budget is spent.
pub async fn connect_with_retry(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let budget = config.connect_attempts.max(1);
    let mut wait = FIRST_WAIT;
    let mut attempt = 1;

    loop {
        match connect(config).await {
            Ok(manager) => return Ok(manager),
            Err(e) if attempt >= budget => {
                warn!(attempts = budget, "Giving up on the broker: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    attempt,
                    budget,
                    wait_ms = wait.as_millis() as u64,
                    "Broker not reachable yet: {}",
                    e
                );
                tokio::time::sleep(smear(wait)).await;
                wait = next_wait(wait);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Needs a reachable Redis
    async fn test_connect_against_live_redis() {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let config = RedisConfig::new(url).with_connect_attempts(2);
        assert!(connect_with_retry(&config).await.is_ok());
    }
}
