//! Source rows read by the feed, and the feed item they normalize into.
//! Plain data: no DB or aggregation logic here.

use chrono::{DateTime, Utc};
use common::types::{ActivityType, PostKind, TradeSide, TradeStatus};
use rust_decimal::Decimal;
use serde::Serialize;

/// Row in `posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: i64,
    pub bot_id: i64,
    pub content: String,
    pub kind: PostKind,
    /// Id assigned by the social platform once published.
    pub tweet_id: Option<String>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Row in `trades`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRecord {
    pub id: i64,
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

/// Row in `audit_logs`. `bot_id = None` marks a system-level event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogRecord {
    pub id: i64,
    pub bot_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRef {
    pub id: i64,
    pub name: String,
    pub owner_user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotAvatar {
    pub bot_id: i64,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetails {
    pub content: String,
    pub tweet_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDetails {
    pub token_address: String,
    pub token_symbol: Option<String>,
    pub sol_amount: Decimal,
    pub token_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub status: TradeStatus,
    pub side: TradeSide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ActivityDetails {
    Post(PostDetails),
    Trade(TradeDetails),
    /// Audit log payload, passed through verbatim.
    System(serde_json::Value),
}

/// One entry of the combined feed. `id` is `{type}-{source id}`, unique
/// across the three sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedActivityItem {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub action: String,
    pub bot_id: i64,
    pub bot_name: String,
    pub owner_username: String,
    pub avatar_url: Option<String>,
    pub details: ActivityDetails,
    pub created_at: Option<DateTime<Utc>>,
}

impl CombinedActivityItem {
    /// Milliseconds since epoch; a missing timestamp counts as epoch 0.
    pub fn sort_millis(&self) -> i64 {
        self.created_at.map_or(0, |ts| ts.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_item_serializes_camel_case_with_type_tag() {
        let item = CombinedActivityItem {
            id: "trade-9".to_string(),
            activity_type: ActivityType::Trade,
            action: "token_bought".to_string(),
            bot_id: 3,
            bot_name: "degen".to_string(),
            owner_username: "alice".to_string(),
            avatar_url: None,
            details: ActivityDetails::Trade(TradeDetails {
                token_address: "So11111111111111111111111111111111111111112".to_string(),
                token_symbol: Some("WSOL".to_string()),
                sol_amount: Decimal::from_str("0.25").unwrap(),
                token_amount: None,
                tx_hash: Some("5abc".to_string()),
                status: TradeStatus::Completed,
                side: TradeSide::Buy,
            }),
            created_at: Some(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["botName"], "degen");
        assert_eq!(json["ownerUsername"], "alice");
        assert_eq!(json["avatarUrl"], serde_json::Value::Null);
        assert_eq!(json["details"]["solAmount"], "0.25");
        assert_eq!(json["details"]["side"], "buy");
        assert_eq!(json["details"]["status"], "completed");
    }

    #[test]
    fn test_post_details_use_type_key_for_kind() {
        let details = ActivityDetails::Post(PostDetails {
            content: "gm".to_string(),
            tweet_id: Some("1799".to_string()),
            kind: PostKind::Reply,
            status: "posted".to_string(),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["tweetId"], "1799");
    }

    #[test]
    fn test_system_details_pass_through() {
        let payload = serde_json::json!({"reason": "maintenance", "affected": [1, 2]});
        let json = serde_json::to_value(ActivityDetails::System(payload.clone())).unwrap();
        assert_eq!(json, payload);
    }
}
