use anyhow::Result;
use common::config::Activity as ActivityConfig;
use common::types::{ActivityType, PostKind, TradeSide};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use crate::records::{
    ActivityDetails, AuditLogRecord, BotRef, CombinedActivityItem, PostDetails, PostRecord,
    TradeDetails, TradeRecord,
};
use crate::source::ActivitySource;

/// Placeholder for a bot or owner that no longer resolves.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for audit events that no bot (or user) triggered.
pub const SYSTEM: &str = "System";

const CONTENT_PREVIEW_CHARS: usize = 120;

/// Feed size requested by a caller, after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimit(usize);

impl FeedLimit {
    pub fn resolve(requested: Option<usize>, config: &ActivityConfig) -> Self {
        Self(requested.unwrap_or(config.default_limit).min(config.max_limit))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Merge the newest posts, trades and audit logs into one feed, newest first.
///
/// `limit` rows are fetched from each source so the merged top `limit` is
/// exact. Bot, owner and avatar metadata are resolved with a fixed number of
/// batched lookups; references that do not resolve fall back to
/// [`UNKNOWN`]/[`SYSTEM`] instead of failing the feed.
pub async fn combined_activity<S: ActivitySource>(
    source: &S,
    limit: usize,
) -> Result<Vec<CombinedActivityItem>> {
    let (posts, trades, logs) = tokio::try_join!(
        source.list_recent_posts(limit),
        source.list_recent_trades(limit),
        source.list_recent_audit_logs(limit),
    )?;

    let bot_ids = referenced_bot_ids(&posts, &trades, &logs);
    if bot_ids.is_empty() {
        tracing::debug!(limit, "no bots referenced by recent activity");
        return Ok(Vec::new());
    }

    let lookups = Lookups::resolve(source, &bot_ids, &logs).await?;

    let mut items = Vec::with_capacity(posts.len() + trades.len() + logs.len());
    items.extend(posts.iter().map(|p| lookups.post_item(p)));
    items.extend(trades.iter().map(|t| lookups.trade_item(t)));
    items.extend(logs.iter().map(|l| lookups.log_item(l)));

    // Stable: equal timestamps keep post, trade, log order.
    items.sort_by_key(|item| Reverse(item.sort_millis()));
    items.truncate(limit);

    tracing::debug!(
        limit,
        posts = posts.len(),
        trades = trades.len(),
        logs = logs.len(),
        bots = bot_ids.len(),
        returned = items.len(),
        "combined activity assembled"
    );
    for item in &items {
        metrics::counter!(
            "botfeed_activity_items_total",
            "type" => item.activity_type.as_str()
        )
        .increment(1);
    }

    Ok(items)
}

fn referenced_bot_ids(
    posts: &[PostRecord],
    trades: &[TradeRecord],
    logs: &[AuditLogRecord],
) -> Vec<i64> {
    let ids: BTreeSet<i64> = posts
        .iter()
        .map(|p| p.bot_id)
        .chain(trades.iter().map(|t| t.bot_id))
        .chain(logs.iter().filter_map(|l| l.bot_id))
        .collect();
    ids.into_iter().collect()
}

/// Per-call lookup tables. Never shared between feed requests.
struct Lookups {
    bots: HashMap<i64, BotRef>,
    usernames: HashMap<i64, String>,
    avatars: HashMap<i64, String>,
}

impl Lookups {
    async fn resolve<S: ActivitySource>(
        source: &S,
        bot_ids: &[i64],
        logs: &[AuditLogRecord],
    ) -> Result<Self> {
        let (bots, avatars) = tokio::try_join!(
            source.get_bots_by_ids(bot_ids),
            source.get_bot_avatars_by_ids(bot_ids),
        )?;

        // Owners of the referenced bots, plus whoever acted on bot-less events.
        let user_ids: Vec<i64> = bots
            .iter()
            .map(|b| b.owner_user_id)
            .chain(logs.iter().filter(|l| l.bot_id.is_none()).filter_map(|l| l.user_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users = source.get_users_by_ids(&user_ids).await?;

        Ok(Self {
            bots: bots.into_iter().map(|b| (b.id, b)).collect(),
            usernames: users.into_iter().map(|u| (u.id, u.username)).collect(),
            avatars: avatars
                .into_iter()
                .map(|a| (a.bot_id, a.avatar_url))
                .collect(),
        })
    }

    /// (bot name, owner username) for a bot id, or `Unknown` for either half.
    fn bot_identity(&self, bot_id: i64) -> (String, String) {
        match self.bots.get(&bot_id) {
            Some(bot) => {
                let owner = self
                    .usernames
                    .get(&bot.owner_user_id)
                    .map_or_else(|| UNKNOWN.to_string(), Clone::clone);
                (bot.name.clone(), owner)
            }
            None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        }
    }

    fn avatar(&self, bot_id: i64) -> Option<String> {
        self.avatars.get(&bot_id).cloned()
    }

    fn post_item(&self, post: &PostRecord) -> CombinedActivityItem {
        let (bot_name, owner_username) = self.bot_identity(post.bot_id);
        let action = match post.kind {
            PostKind::Reply => "reply_posted",
            PostKind::Original => "tweet_posted",
        };
        CombinedActivityItem {
            id: format!("{}-{}", ActivityType::Tweet, post.id),
            activity_type: ActivityType::Tweet,
            action: action.to_string(),
            bot_id: post.bot_id,
            bot_name,
            owner_username,
            avatar_url: self.avatar(post.bot_id),
            details: ActivityDetails::Post(PostDetails {
                content: post.content.chars().take(CONTENT_PREVIEW_CHARS).collect(),
                tweet_id: post.tweet_id.clone(),
                kind: post.kind,
                status: post.status.clone(),
            }),
            created_at: post.created_at,
        }
    }

    fn trade_item(&self, trade: &TradeRecord) -> CombinedActivityItem {
        let (bot_name, owner_username) = self.bot_identity(trade.bot_id);
        let action = match trade.side {
            TradeSide::Buy => "token_bought",
            TradeSide::Sell => "token_sold",
        };
        CombinedActivityItem {
            id: format!("{}-{}", ActivityType::Trade, trade.id),
            activity_type: ActivityType::Trade,
            action: action.to_string(),
            bot_id: trade.bot_id,
            bot_name,
            owner_username,
            avatar_url: self.avatar(trade.bot_id),
            details: ActivityDetails::Trade(TradeDetails {
                token_address: trade.token_address.clone(),
                token_symbol: trade.token_symbol.clone(),
                sol_amount: trade.sol_amount,
                token_amount: trade.token_amount,
                tx_hash: trade.tx_hash.clone(),
                status: trade.status,
                side: trade.side,
            }),
            created_at: trade.created_at,
        }
    }

    fn log_item(&self, log: &AuditLogRecord) -> CombinedActivityItem {
        let (bot_name, owner_username) = match (log.bot_id, log.user_id) {
            (Some(bot_id), _) => self.bot_identity(bot_id),
            (None, Some(user_id)) => (
                SYSTEM.to_string(),
                self.usernames
                    .get(&user_id)
                    .map_or_else(|| UNKNOWN.to_string(), Clone::clone),
            ),
            (None, None) => (SYSTEM.to_string(), SYSTEM.to_string()),
        };
        let bot_id = log.bot_id.unwrap_or(0);
        CombinedActivityItem {
            id: format!("{}-{}", ActivityType::System, log.id),
            activity_type: ActivityType::System,
            action: log.action.clone(),
            bot_id,
            bot_name,
            owner_username,
            avatar_url: log.bot_id.and_then(|id| self.avatar(id)),
            details: ActivityDetails::System(log.details.clone()),
            created_at: log.created_at,
        }
    }
}
