use anyhow::Result;
use common::db::{parse_db_timestamp, AsyncDb};
use common::types::{PostKind, TradeSide, TradeStatus};
use rusqlite::types::Type;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::records::{AuditLogRecord, BotAvatar, BotRef, PostRecord, TradeRecord, UserRef};

/// Read side the feed pulls from. `list_recent_*` return at most `limit`
/// rows, newest first. Lookups by id ignore ids that do not exist.
pub trait ActivitySource {
    fn list_recent_posts(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<PostRecord>>> + Send;

    fn list_recent_trades(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<TradeRecord>>> + Send;

    fn list_recent_audit_logs(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<AuditLogRecord>>> + Send;

    fn get_bots_by_ids(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<BotRef>>> + Send;

    fn get_users_by_ids(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<UserRef>>> + Send;

    fn get_bot_avatars_by_ids(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<BotAvatar>>> + Send;
}

/// [`ActivitySource`] over the botfeed SQLite schema.
///
/// Recency is ordered by `julianday(created_at)`, so SQLite-style and
/// RFC 3339 text (with offsets) compare as instants. Missing or unparseable
/// timestamps sort after every dated row.
#[derive(Clone)]
pub struct SqliteActivitySource {
    db: AsyncDb,
}

impl SqliteActivitySource {
    pub fn new(db: AsyncDb) -> Self {
        Self { db }
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// `?1, ?2, ..., ?n`
fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn timestamp_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_db_timestamp))
}

fn decimal_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(s.trim())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn trade_status_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<TradeStatus> {
    let raw: String = row.get(idx)?;
    TradeStatus::from_str_loose(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown trade status: {raw}").into(),
        )
    })
}

/// Stored audit details are JSON text. Text that does not parse is kept as
/// a JSON string rather than dropped.
fn details_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: Option<String> = row.get(idx)?;
    Ok(match raw {
        None => serde_json::Value::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
    })
}

impl ActivitySource for SqliteActivitySource {
    async fn list_recent_posts(&self, limit: usize) -> Result<Vec<PostRecord>> {
        self.db
            .call_named("activity.list_recent_posts", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, bot_id, content, kind, tweet_id, status, created_at
                     FROM posts
                     ORDER BY julianday(created_at) DESC NULLS LAST, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([sql_limit(limit)], |row| {
                        let kind: String = row.get(3)?;
                        Ok(PostRecord {
                            id: row.get(0)?,
                            bot_id: row.get(1)?,
                            content: row.get(2)?,
                            kind: PostKind::from_str_loose(&kind),
                            tweet_id: row.get(4)?,
                            status: row.get(5)?,
                            created_at: timestamp_column(row, 6)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn list_recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        self.db
            .call_named("activity.list_recent_trades", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, bot_id, token_address, token_symbol, sol_amount, token_amount,
                            tx_hash, side, status, created_at
                     FROM trades
                     ORDER BY julianday(created_at) DESC NULLS LAST, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([sql_limit(limit)], |row| {
                        let side: String = row.get(7)?;
                        Ok(TradeRecord {
                            id: row.get(0)?,
                            bot_id: row.get(1)?,
                            token_address: row.get(2)?,
                            token_symbol: row.get(3)?,
                            sol_amount: decimal_column(row, 4)?.unwrap_or_default(),
                            token_amount: decimal_column(row, 5)?,
                            tx_hash: row.get(6)?,
                            side: TradeSide::from_str_loose(&side),
                            status: trade_status_column(row, 8)?,
                            created_at: timestamp_column(row, 9)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn list_recent_audit_logs(&self, limit: usize) -> Result<Vec<AuditLogRecord>> {
        self.db
            .call_named("activity.list_recent_audit_logs", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, bot_id, user_id, action, details, created_at
                     FROM audit_logs
                     ORDER BY julianday(created_at) DESC NULLS LAST, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([sql_limit(limit)], |row| {
                        Ok(AuditLogRecord {
                            id: row.get(0)?,
                            bot_id: row.get(1)?,
                            user_id: row.get(2)?,
                            action: row.get(3)?,
                            details: details_column(row, 4)?,
                            created_at: timestamp_column(row, 5)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_bots_by_ids(&self, ids: &[i64]) -> Result<Vec<BotRef>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.db
            .call_named("activity.get_bots_by_ids", move |conn| {
                let sql = format!(
                    "SELECT id, name, user_id FROM bots WHERE id IN ({})",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                        Ok(BotRef {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            owner_user_id: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRef>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.db
            .call_named("activity.get_users_by_ids", move |conn| {
                let sql = format!(
                    "SELECT id, username FROM users WHERE id IN ({})",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                        Ok(UserRef {
                            id: row.get(0)?,
                            username: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_bot_avatars_by_ids(&self, ids: &[i64]) -> Result<Vec<BotAvatar>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.db
            .call_named("activity.get_bot_avatars_by_ids", move |conn| {
                let sql = format!(
                    "SELECT bot_id, avatar_url FROM bot_avatars WHERE bot_id IN ({})",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                        Ok(BotAvatar {
                            bot_id: row.get(0)?,
                            avatar_url: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_source() -> SqliteActivitySource {
        let db = AsyncDb::open(":memory:").await.unwrap();
        db.call(|conn| {
            conn.execute_batch(
                "INSERT INTO users (id, username) VALUES (1, 'alice'), (2, 'bob');
                 INSERT INTO bots (id, user_id, name) VALUES (10, 1, 'alpha'), (11, 2, 'beta');
                 INSERT INTO bot_avatars (bot_id, avatar_url) VALUES (10, 'https://cdn.example/alpha.png');
                 INSERT INTO posts (bot_id, content, kind, tweet_id, created_at) VALUES
                    (10, 'first', 'original', 't1', '2026-01-01 10:00:00'),
                    (11, 'second', 'reply', 't2', '2026-01-01 12:00:00'),
                    (10, 'undated', 'original', NULL, NULL);
                 INSERT INTO trades (bot_id, token_address, token_symbol, sol_amount, token_amount, tx_hash, side, status, created_at) VALUES
                    (10, 'Mint1', 'AAA', '1.5', '1000', 'sig1', 'buy', 'completed', '2026-01-01 11:00:00');
                 INSERT INTO audit_logs (bot_id, user_id, action, details, created_at) VALUES
                    (NULL, NULL, 'maintenance', '{\"window\":\"1h\"}', '2026-01-01 09:00:00'),
                    (10, 1, 'bot_paused', 'not json', '2026-01-01 09:30:00');",
            )?;
            Ok(())
        })
        .await
        .unwrap();
        SqliteActivitySource::new(db)
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?1");
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }

    #[tokio::test]
    async fn test_posts_newest_first_with_nulls_last() {
        let source = seeded_source().await;
        let posts = source.list_recent_posts(10).await.unwrap();
        let contents: Vec<&str> = posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first", "undated"]);
        assert_eq!(posts[0].kind, PostKind::Reply);
        assert!(posts[2].created_at.is_none());
    }

    #[tokio::test]
    async fn test_limit_is_applied_per_source() {
        let source = seeded_source().await;
        assert_eq!(source.list_recent_posts(2).await.unwrap().len(), 2);
        assert!(source.list_recent_posts(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trades_decode_decimals_and_enums() {
        let source = seeded_source().await;
        let trades = source.list_recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.sol_amount, Decimal::from_str("1.5").unwrap());
        assert_eq!(t.token_amount, Some(Decimal::from(1000)));
        assert_eq!(t.side, TradeSide::Buy);
        assert_eq!(t.status, TradeStatus::Completed);
    }

    #[tokio::test]
    async fn test_audit_details_parse_or_pass_through() {
        let source = seeded_source().await;
        let logs = source.list_recent_audit_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "bot_paused");
        assert_eq!(logs[0].details, serde_json::Value::String("not json".into()));
        assert_eq!(logs[1].bot_id, None);
        assert_eq!(logs[1].details["window"], "1h");
    }

    #[tokio::test]
    async fn test_lookups_by_ids_skip_missing() {
        let source = seeded_source().await;

        let mut bots = source.get_bots_by_ids(&[10, 11, 404]).await.unwrap();
        bots.sort_by_key(|b| b.id);
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[1].owner_user_id, 2);

        let users = source.get_users_by_ids(&[1]).await.unwrap();
        assert_eq!(users, vec![UserRef { id: 1, username: "alice".into() }]);

        let avatars = source.get_bot_avatars_by_ids(&[10, 11]).await.unwrap();
        assert_eq!(avatars.len(), 1);
        assert_eq!(avatars[0].bot_id, 10);

        assert!(source.get_bots_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_timestamp_formats_order_by_instant() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        db.call(|conn| {
            conn.execute_batch(
                "INSERT INTO posts (id, bot_id, content, created_at) VALUES
                    (1, 10, 'morning', '2026-01-01T08:00:00Z'),
                    (2, 10, 'evening', '2026-01-01 20:00:00'),
                    (3, 10, 'offset', '2026-01-01T21:00:00+05:00'),
                    (4, 10, 'garbled', 'last tuesday');",
            )?;
            Ok(())
        })
        .await
        .unwrap();
        let source = SqliteActivitySource::new(db);

        let newest = source.list_recent_posts(1).await.unwrap();
        assert_eq!(newest[0].content, "evening");

        let posts = source.list_recent_posts(10).await.unwrap();
        let contents: Vec<&str> = posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["evening", "offset", "morning", "garbled"]);
        assert!(posts[3].created_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_trade_status_is_an_error() {
        let source = seeded_source().await;
        source
            .db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO trades (bot_id, token_address, sol_amount, side, status)
                     VALUES (10, 'Mint2', '0.1', 'sell', 'exploded')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(source.list_recent_trades(10).await.is_err());
    }
}
