use crate::redis_client::RedisClient;

pub mod ledger;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ledger_ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, ledger_ttl_seconds: u64) -> Self {
        Self { redis, ledger_ttl_seconds }
    }
}
