use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::db::{format_db_timestamp, AsyncDb};
use common::types::{BotStatus, PostKind, TradeSide, TradeStatus};
use rusqlite::OptionalExtension;
use rust_decimal::Decimal;
use vault::SecretCodec;

/// Write side of the botfeed schema, plus wallet and token secrets.
///
/// Secrets only ever reach SQLite as codec blobs.
#[derive(Clone)]
pub struct BotStore {
    db: AsyncDb,
    codec: SecretCodec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBot {
    pub id: i64,
    pub public_address: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub bot_id: i64,
    pub content: String,
    pub kind: PostKind,
    pub tweet_id: Option<String>,
    pub status: String,
    /// `None` stamps the row with the current time.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTrade {
    pub bot_id: i64,
    pub token_address: String,
    pub token_symbol: Option<String>,
    pub sol_amount: Decimal,
    pub token_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub side: TradeSide,
    pub status: TradeStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub bot_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

fn stamp(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(format_db_timestamp)
}

impl BotStore {
    pub fn new(db: AsyncDb, codec: SecretCodec) -> Self {
        Self { db, codec }
    }

    pub fn db(&self) -> &AsyncDb {
        &self.db
    }

    pub async fn create_user(&self, username: &str) -> Result<i64> {
        let username = username.to_string();
        self.db
            .call_named("store.create_user", move |conn| {
                conn.execute(
                    "INSERT INTO users (username) VALUES (?1)",
                    rusqlite::params![username],
                )
                .with_context(|| format!("failed to create user {username}"))?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Create a bot and provision its wallet in one transaction.
    pub async fn create_bot(&self, owner_user_id: i64, name: &str) -> Result<NewBot> {
        let keypair = vault::generate_wallet_keypair();
        let encrypted = self.codec.encrypt(&keypair.private_key)?;
        let public_address = keypair.public_address;
        let name = name.to_string();

        let address = public_address.clone();
        let id = self
            .db
            .call_named("store.create_bot", move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO bots (user_id, name) VALUES (?1, ?2)",
                    rusqlite::params![owner_user_id, name],
                )
                .with_context(|| format!("failed to create bot for user {owner_user_id}"))?;
                let id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO bot_wallets (bot_id, public_address, encrypted_private_key)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, address, encrypted],
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await?;

        tracing::info!(bot_id = id, owner_user_id, address = %public_address, "bot created");
        Ok(NewBot { id, public_address })
    }

    pub async fn set_bot_status(&self, bot_id: i64, status: BotStatus) -> Result<bool> {
        self.db
            .call_named("store.set_bot_status", move |conn| {
                let n = conn.execute(
                    "UPDATE bots SET status = ?1,
                        updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                     WHERE id = ?2",
                    rusqlite::params![status.as_str(), bot_id],
                )?;
                Ok(n > 0)
            })
            .await
    }

    pub async fn set_bot_avatar(&self, bot_id: i64, avatar_url: &str) -> Result<()> {
        let avatar_url = avatar_url.to_string();
        self.db
            .call_named("store.set_bot_avatar", move |conn| {
                conn.execute(
                    "INSERT INTO bot_avatars (bot_id, avatar_url) VALUES (?1, ?2)
                     ON CONFLICT(bot_id) DO UPDATE SET
                        avatar_url = excluded.avatar_url,
                        updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
                    rusqlite::params![bot_id, avatar_url],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn record_post(&self, post: NewPost) -> Result<i64> {
        self.db
            .call_named("store.record_post", move |conn| {
                conn.execute(
                    "INSERT INTO posts (bot_id, content, kind, tweet_id, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5,
                             COALESCE(?6, strftime('%Y-%m-%d %H:%M:%f', 'now')))",
                    rusqlite::params![
                        post.bot_id,
                        post.content,
                        post.kind.as_str(),
                        post.tweet_id,
                        post.status,
                        stamp(post.created_at.as_ref()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    pub async fn record_trade(&self, trade: NewTrade) -> Result<i64> {
        self.db
            .call_named("store.record_trade", move |conn| {
                conn.execute(
                    "INSERT INTO trades (bot_id, token_address, token_symbol, sol_amount,
                                         token_amount, tx_hash, side, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                             COALESCE(?9, strftime('%Y-%m-%d %H:%M:%f', 'now')))",
                    rusqlite::params![
                        trade.bot_id,
                        trade.token_address,
                        trade.token_symbol,
                        trade.sol_amount.to_string(),
                        trade.token_amount.map(|a| a.to_string()),
                        trade.tx_hash,
                        trade.side.as_str(),
                        trade.status.as_str(),
                        stamp(trade.created_at.as_ref()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    pub async fn set_trade_status(
        &self,
        trade_id: i64,
        status: TradeStatus,
        tx_hash: Option<String>,
    ) -> Result<bool> {
        self.db
            .call_named("store.set_trade_status", move |conn| {
                let n = conn.execute(
                    "UPDATE trades SET status = ?1, tx_hash = COALESCE(?2, tx_hash) WHERE id = ?3",
                    rusqlite::params![status.as_str(), tx_hash, trade_id],
                )?;
                Ok(n > 0)
            })
            .await
    }

    pub async fn record_audit_log(&self, entry: NewAuditLog) -> Result<i64> {
        let details = match &entry.details {
            serde_json::Value::Null => None,
            other => Some(serde_json::to_string(other)?),
        };
        self.db
            .call_named("store.record_audit_log", move |conn| {
                conn.execute(
                    "INSERT INTO audit_logs (bot_id, user_id, action, details, created_at)
                     VALUES (?1, ?2, ?3, ?4,
                             COALESCE(?5, strftime('%Y-%m-%d %H:%M:%f', 'now')))",
                    rusqlite::params![
                        entry.bot_id,
                        entry.user_id,
                        entry.action,
                        details,
                        stamp(entry.created_at.as_ref()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    pub async fn wallet_address(&self, bot_id: i64) -> Result<Option<String>> {
        self.db
            .call_named("store.wallet_address", move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT public_address FROM bot_wallets WHERE bot_id = ?1",
                        [bot_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    /// Decrypt a bot's private key and audit the reveal.
    ///
    /// A blob that fails to decrypt surfaces as [`vault::VaultError`] inside
    /// the returned error; nothing is audited in that case.
    pub async fn reveal_wallet_key(
        &self,
        bot_id: i64,
        acting_user_id: Option<i64>,
    ) -> Result<Option<String>> {
        let blob: Option<String> = self
            .db
            .call_named("store.load_wallet_blob", move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT encrypted_private_key FROM bot_wallets WHERE bot_id = ?1",
                        [bot_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        let Some(blob) = blob else {
            return Ok(None);
        };

        let private_key = match self.codec.decrypt(&blob) {
            Ok(key) => key,
            Err(err) => {
                tracing::error!(bot_id, error = %err, "wallet key failed to decrypt");
                return Err(anyhow::Error::from(err)
                    .context(format!("cannot reveal wallet key for bot {bot_id}")));
            }
        };

        self.record_audit_log(NewAuditLog {
            bot_id: Some(bot_id),
            user_id: acting_user_id,
            action: "wallet_key_revealed".to_string(),
            details: serde_json::Value::Null,
            created_at: None,
        })
        .await?;

        Ok(Some(private_key))
    }

    /// Replace a bot's wallet with an imported keypair. Returns its address.
    pub async fn import_wallet(&self, bot_id: i64, private_key: &str) -> Result<String> {
        let address = vault::address_from_private_key(private_key)?;
        let encrypted = self.codec.encrypt(private_key)?;

        let stored = address.clone();
        self.db
            .call_named("store.import_wallet", move |conn| {
                conn.execute(
                    "INSERT INTO bot_wallets (bot_id, public_address, encrypted_private_key)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(bot_id) DO UPDATE SET
                        public_address = excluded.public_address,
                        encrypted_private_key = excluded.encrypted_private_key",
                    rusqlite::params![bot_id, stored, encrypted],
                )
                .with_context(|| format!("failed to import wallet for bot {bot_id}"))?;
                Ok(())
            })
            .await?;
        Ok(address)
    }

    pub async fn store_social_token(&self, bot_id: i64, provider: &str, token: &str) -> Result<()> {
        let encrypted = self.codec.encrypt(token)?;
        let provider = provider.to_string();
        self.db
            .call_named("store.store_social_token", move |conn| {
                conn.execute(
                    "INSERT INTO bot_social_tokens (bot_id, provider, encrypted_token)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(bot_id, provider) DO UPDATE SET
                        encrypted_token = excluded.encrypted_token,
                        updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
                    rusqlite::params![bot_id, provider, encrypted],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn load_social_token(&self, bot_id: i64, provider: &str) -> Result<Option<String>> {
        let provider = provider.to_string();
        let blob: Option<String> = self
            .db
            .call_named("store.load_social_token", move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT encrypted_token FROM bot_social_tokens
                         WHERE bot_id = ?1 AND provider = ?2",
                        rusqlite::params![bot_id, provider],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        blob.map(|b| self.codec.decrypt(&b))
            .transpose()
            .map_err(anyhow::Error::from)
    }
}
