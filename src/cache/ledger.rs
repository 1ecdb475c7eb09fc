use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::error::BookingResult;
use crate::services::ledger::{LedgerSummary, LedgerWatcher, SessionLedger};

fn ledger_key(member_id: i64) -> String {
    format!("ledger:{}", member_id)
}

impl CacheService {
    // Сводка по пакетам участника: сначала кеш, потом пересчёт из БД
    pub async fn get_ledger_summary(&self, member_id: i64, ledger: &SessionLedger) -> BookingResult<LedgerSummary> {
        if let Ok(summary) = self.get_summary_from_cache(member_id).await {
            debug!("Ledger summary of member {} served from cache", member_id);
            return Ok(summary);
        }

        let summary = ledger.summary(member_id).await?;
        if let Err(e) = self.save_summary_to_cache(&summary).await {
            warn!("Failed to cache ledger summary of member {}: {}", member_id, e);
        }
        Ok(summary)
    }

    pub async fn invalidate_ledger(&self, member_id: i64) {
        let mut conn = self.redis.conn.clone();
        if let Err(e) = conn.del::<_, ()>(ledger_key(member_id)).await {
            warn!("Failed to invalidate ledger cache of member {}: {}", member_id, e);
        }
    }

    // === Работа с кешем ===
    async fn get_summary_from_cache(&self, member_id: i64) -> Result<LedgerSummary, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: String = conn.get(ledger_key(member_id)).await?;
        serde_json::from_str(&data)
            .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error")))
    }

    async fn save_summary_to_cache(&self, summary: &LedgerSummary) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(summary)
            .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error")))?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(ledger_key(summary.member_id), data, self.ledger_ttl_seconds).await
    }
}

#[async_trait]
impl LedgerWatcher for CacheService {
    async fn ledger_changed(&self, member_id: i64) {
        self.invalidate_ledger(member_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_member() {
        assert_eq!(ledger_key(42), "ledger:42");
    }
}
