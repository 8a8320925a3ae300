//! Typed lookups and writers for the entities the bot reads most

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{Invalidation, Optimizer};
use crate::cache::Namespace;
use crate::error::Result;
use crate::query::{coerce_bool, QueryResult};
use crate::storage::{parse_json_column, Record};

/// Settings of a chat with no stored record
pub const DEFAULT_CHAT_SETTINGS: &[(&str, i64)] = &[
    ("spam", 0),
    ("links", 0),
    ("cooldown", 0),
    ("groups", 0),
    ("stickers", 0),
    ("docs", 0),
    ("images", 0),
    ("video", 0),
    ("reposts", 0),
];

fn default_chat_settings() -> Record {
    let mut settings: Record = DEFAULT_CHAT_SETTINGS
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(*value)))
        .collect();
    settings.insert("attachments".to_string(), Value::Array(Vec::new()));
    settings
}

/// VIP membership of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipStatus {
    pub is_vip: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub granted_by: Option<Value>,
    pub is_permanent: bool,
}

impl VipStatus {
    fn from_record(record: &Record) -> Self {
        VipStatus {
            is_vip: true,
            expiry_date: record.get("expiry_date").and_then(parse_timestamp),
            granted_by: record.get("granted_by").filter(|v| !v.is_null()).cloned(),
            is_permanent: record.get("is_permanent").and_then(coerce_bool).unwrap_or(false),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_permanent && self.expiry_date.is_some_and(|expiry| now > expiry)
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .ok()
}

/// Largest float magnitude up to which every integer is exact
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn role_file_key(conference: i64, user: i64) -> String {
    Invalidation::new(Namespace::UserRoles, (conference, user))
        .file_key()
        .unwrap_or_default()
}

fn settings_file_key(peer: i64) -> String {
    Invalidation::new(Namespace::ChatSettings, peer)
        .file_key()
        .unwrap_or_default()
}

/// `blocked_users` of one row, stored as an array or as JSON text
fn blocked_users(record: &Record) -> Vec<Value> {
    match record.get("blocked_users").map(parse_json_column) {
        Some(Value::Array(users)) => users,
        _ => Vec::new(),
    }
}

impl Optimizer {
    // ========================================================================
    // Roles
    // ========================================================================

    /// Role of `user` in `conference`; 0 when unknown or unreadable
    pub async fn user_role(&self, conference: i64, user: i64) -> i64 {
        let loaded = self
            .get_one(Namespace::UserRoles, (conference, user), || async move {
                Ok(Value::from(self.load_role(conference, user).await))
            })
            .await;

        loaded.ok().as_ref().and_then(as_int).unwrap_or(0)
    }

    pub async fn user_roles_batch(&self, conference: i64, users: Vec<i64>) -> HashMap<i64, i64> {
        let this = self.clone();
        let keys: Vec<(i64, i64)> = users.iter().map(|user| (conference, *user)).collect();

        let loaded = self
            .get_batch(Namespace::UserRoles, keys, move |(conference, user)| {
                let this = this.clone();
                async move { Ok(Value::from(this.load_role(conference, user).await)) }
            })
            .await;

        match loaded {
            Ok(roles) => roles
                .into_iter()
                .map(|((_, user), role)| (user, as_int(&role).unwrap_or(0)))
                .collect(),
            Err(e) => {
                tracing::warn!("Role batch for conference {} failed: {}", conference, e);
                users.into_iter().map(|user| (user, 0)).collect()
            }
        }
    }

    async fn load_role(&self, conference: i64, user: i64) -> i64 {
        let table = format!("roles_{}", conference);
        match self
            .cached_record(&role_file_key(conference, user), &table, &user.to_string())
            .await
        {
            Ok(record) => record
                .as_ref()
                .and_then(|r| r.get("role_id"))
                .and_then(as_int)
                .unwrap_or(0),
            Err(e) => {
                tracing::debug!("Role of {} in {} unreadable: {}", user, conference, e);
                0
            }
        }
    }

    pub async fn set_user_role(&self, conference: i64, user: i64, role: i64) -> Result<QueryResult> {
        let sql = format!(
            "INSERT INTO roles_{} (user_id, role_id) VALUES (?, ?) ON DUPLICATE KEY UPDATE role_id = VALUES(role_id)",
            conference
        );
        self.execute_write(&sql, vec![json!(user), json!(role)], &[Invalidation::new(Namespace::UserRoles, (conference, user))])
            .await
    }

    pub fn invalidate_user_role(&self, conference: i64, user: i64) {
        self.invalidate(&Invalidation::new(Namespace::UserRoles, (conference, user)));
    }

    // ========================================================================
    // Chat settings
    // ========================================================================

    /// Settings of chat `peer`, or the defaults when none are stored
    pub async fn chat_settings(&self, peer: i64) -> Result<Record> {
        let value = self
            .get_one(Namespace::ChatSettings, peer, || async move {
                let stored = self
                    .cached_record(&settings_file_key(peer), "conference", &peer.to_string())
                    .await?;
                Ok(stored.unwrap_or_else(|| Value::Object(default_chat_settings())))
            })
            .await?;

        Ok(match value {
            Value::Object(settings) => settings,
            _ => default_chat_settings(),
        })
    }

    /// Merge `changes` into the stored settings of chat `peer`
    pub async fn update_chat_settings(&self, peer: i64, changes: &Record) -> Result<QueryResult> {
        let mut record = changes.clone();
        record.insert("conference_id".to_string(), json!(peer));

        self.execute_write(
            "INSERT INTO conference SET ? ON DUPLICATE KEY UPDATE conference_id = conference_id",
            vec![Value::Object(record)],
            &[Invalidation::new(Namespace::ChatSettings, peer)],
        )
        .await
    }

    pub fn invalidate_chat_settings(&self, peer: i64) {
        self.invalidate(&Invalidation::new(Namespace::ChatSettings, peer));
    }

    // ========================================================================
    // Ban lists
    // ========================================================================

    /// Every user blocked in chat `peer`.
    ///
    /// Reads the `conference_<peer>` table, then any `conference/<peer>_*`
    /// records left in the older per-user layout.
    pub async fn ban_list(&self, peer: i64) -> Result<Vec<Value>> {
        let value = self
            .get_one(Namespace::BanLists, peer, || async move {
                let sql = format!("SELECT user_id, blocked_users FROM conference_{}", peer);
                let rows = self.engine.execute(&sql, ()).await?.into_rows();
                let mut blocked: Vec<Value> = rows.iter().flat_map(blocked_users).collect();

                let prefix = format!("{}_", peer);
                let legacy = self.engine.store().scan("conference")?.collect().await?;
                blocked.extend(
                    legacy
                        .iter()
                        .filter(|(key, _)| key.starts_with(&prefix))
                        .flat_map(|(_, record)| blocked_users(record)),
                );
                Ok(Value::Array(blocked))
            })
            .await?;

        Ok(match value {
            Value::Array(users) => users,
            _ => Vec::new(),
        })
    }

    /// Replace the users `user` has blocked in chat `peer`
    pub async fn set_ban_list(&self, peer: i64, user: i64, blocked: &[Value]) -> Result<QueryResult> {
        let sql = format!(
            "INSERT INTO conference_{} (user_id, blocked_users) VALUES (?, ?) ON DUPLICATE KEY UPDATE blocked_users = VALUES(blocked_users)",
            peer
        );
        let encoded = serde_json::to_string(blocked)?;
        self.execute_write(&sql, vec![json!(user), json!(encoded)], &[Invalidation::new(Namespace::BanLists, peer)])
            .await
    }

    pub fn invalidate_ban_list(&self, peer: i64) {
        self.invalidate(&Invalidation::new(Namespace::BanLists, peer));
    }

    // ========================================================================
    // Nicknames
    // ========================================================================

    pub async fn user_nickname(&self, peer: i64, user: i64) -> Result<Option<String>> {
        let value = self
            .get_one(Namespace::UserNicknames, (peer, user), || async move {
                let table = format!("nicknames_{}", peer);
                let record = self.engine.store().get(&table, &user.to_string()).await?;
                Ok(record
                    .and_then(|mut r| r.remove("nickname"))
                    .unwrap_or(Value::Null))
            })
            .await?;

        Ok(value.as_str().map(String::from))
    }

    pub async fn set_user_nickname(&self, peer: i64, user: i64, nickname: &str) -> Result<QueryResult> {
        let sql = format!(
            "INSERT INTO nicknames_{} (user_id, nickname) VALUES (?, ?) ON DUPLICATE KEY UPDATE nickname = VALUES(nickname)",
            peer
        );
        self.execute_write(&sql, vec![json!(user), json!(nickname)], &[Invalidation::new(Namespace::UserNicknames, (peer, user))])
            .await
    }

    // ========================================================================
    // VIP
    // ========================================================================

    /// VIP status of `user`. An expired grant is deleted and reported absent.
    pub async fn vip_status(&self, user: i64) -> Result<Option<VipStatus>> {
        let value = self
            .get_one(Namespace::VipStatuses, user, || async move {
                let record = self.engine.store().get("vip_users", &user.to_string()).await?;
                Ok(match record {
                    Some(record) => serde_json::to_value(VipStatus::from_record(&record))?,
                    None => Value::Null,
                })
            })
            .await?;

        if value.is_null() {
            return Ok(None);
        }
        let status: VipStatus = serde_json::from_value(value)?;

        if status.is_expired(Utc::now()) {
            tracing::info!("VIP status of {} expired, removing", user);
            self.engine.store().remove("vip_users", &user.to_string()).await?;
            self.cache.invalidate(Namespace::VipStatuses, user);
            return Ok(None);
        }

        Ok(Some(status))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::optimizer;
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_user_role_defaults_to_zero() {
        let (_tmp, opt) = optimizer();
        assert_eq!(opt.user_role(100, 42).await, 0);
        // The default is cached too
        assert_eq!(opt.cache().get(Namespace::UserRoles, "100_42"), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_set_user_role_is_visible_immediately() {
        let (_tmp, opt) = optimizer();
        assert_eq!(opt.user_role(100, 42).await, 0);

        opt.set_user_role(100, 42, 80).await.unwrap();
        assert_eq!(opt.user_role(100, 42).await, 80);

        let roles = opt.user_roles_batch(100, vec![42, 43]).await;
        assert_eq!(roles[&42], 80);
        assert_eq!(roles[&43], 0);
    }

    #[tokio::test]
    async fn test_chat_settings() {
        let (_tmp, opt) = optimizer();

        let settings = opt.chat_settings(7).await.unwrap();
        assert_eq!(settings.get("spam"), Some(&json!(0)));
        assert_eq!(settings.get("attachments"), Some(&json!([])));

        let mut changes = Record::new();
        changes.insert("spam".into(), json!(1));
        opt.update_chat_settings(7, &changes).await.unwrap();

        let settings = opt.chat_settings(7).await.unwrap();
        assert_eq!(settings.get("spam"), Some(&json!(1)));
        assert_eq!(settings.get("conference_id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_ban_list_flattens_rows() {
        let (_tmp, opt) = optimizer();
        assert!(opt.ban_list(5).await.unwrap().is_empty());

        opt.set_ban_list(5, 1, &[json!(10), json!(11)]).await.unwrap();
        opt.set_ban_list(5, 2, &[json!(12)]).await.unwrap();

        let mut banned = opt.ban_list(5).await.unwrap();
        banned.sort_by_key(|v| v.as_i64());
        assert_eq!(banned, vec![json!(10), json!(11), json!(12)]);
    }

    #[tokio::test]
    async fn test_ban_list_reads_per_user_conference_records() {
        let (tmp, opt) = optimizer();
        let dir = tmp.path().join("conference");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("5_1.json"), r#"{"user_id": 1, "blocked_users": [20, 21]}"#).unwrap();
        std::fs::write(dir.join("5_2.json"), r#"{"user_id": 2, "blocked_users": "[22]"}"#).unwrap();
        std::fs::write(dir.join("55_1.json"), r#"{"user_id": 1, "blocked_users": [99]}"#).unwrap();
        std::fs::write(dir.join("5.json"), r#"{"conference_id": 5, "spam": 1}"#).unwrap();

        opt.set_ban_list(5, 3, &[json!(10)]).await.unwrap();

        let mut banned = opt.ban_list(5).await.unwrap();
        banned.sort_by_key(|v| v.as_i64());
        assert_eq!(banned, vec![json!(10), json!(20), json!(21), json!(22)]);
    }

    #[tokio::test]
    async fn test_generic_write_refreshes_typed_reads() {
        let (_tmp, opt) = optimizer();
        opt.set_user_role(100, 42, 1).await.unwrap();
        assert_eq!(opt.user_role(100, 42).await, 1);

        opt.execute_write(
            "UPDATE roles_100 SET role_id = ? WHERE user_id = ?",
            vec![json!(80), json!(42)],
            &[Invalidation::new(Namespace::UserRoles, (100, 42))],
        )
        .await
        .unwrap();
        assert_eq!(opt.user_role(100, 42).await, 80);

        let mut changes = Record::new();
        changes.insert("spam".into(), json!(0));
        opt.update_chat_settings(7, &changes).await.unwrap();
        assert_eq!(opt.chat_settings(7).await.unwrap().get("spam"), Some(&json!(0)));

        opt.execute_write(
            "UPDATE conference SET spam = ? WHERE conference_id = ?",
            vec![json!(1), json!(7)],
            &[Invalidation::new(Namespace::ChatSettings, 7)],
        )
        .await
        .unwrap();
        assert_eq!(opt.chat_settings(7).await.unwrap().get("spam"), Some(&json!(1)));
    }

    #[test]
    fn test_as_int_rejects_inexact_floats() {
        assert_eq!(as_int(&json!(80)), Some(80));
        assert_eq!(as_int(&json!(80.0)), Some(80));
        assert_eq!(as_int(&json!("7")), Some(7));
        assert_eq!(as_int(&json!(80.5)), None);
        assert_eq!(as_int(&json!(1e300)), None);
        assert_eq!(as_int(&json!(true)), None);
    }

    #[test]
    fn test_file_keys_match_invalidations() {
        assert_eq!(role_file_key(100, 42), "role_100_42");
        assert_eq!(settings_file_key(7), "settings_7");
    }

    #[tokio::test]
    async fn test_nicknames() {
        let (_tmp, opt) = optimizer();
        assert_eq!(opt.user_nickname(3, 9).await.unwrap(), None);

        opt.set_user_nickname(3, 9, "neo").await.unwrap();
        assert_eq!(opt.user_nickname(3, 9).await.unwrap().as_deref(), Some("neo"));
    }

    #[tokio::test]
    async fn test_expired_vip_is_removed() {
        let (tmp, opt) = optimizer();
        let expired = (Utc::now() - Duration::days(1)).to_rfc3339();
        let current = (Utc::now() + Duration::days(1)).to_rfc3339();

        opt.engine()
            .execute(
                "INSERT INTO vip_users SET ?",
                vec![json!({"userid": 1, "expiry_date": expired, "granted_by": 5, "is_permanent": 0})],
            )
            .await
            .unwrap();
        opt.engine()
            .execute(
                "INSERT INTO vip_users SET ?",
                vec![json!({"userid": 2, "expiry_date": current, "is_permanent": 0})],
            )
            .await
            .unwrap();
        opt.engine()
            .execute(
                "INSERT INTO vip_users SET ?",
                vec![json!({"userid": 3, "expiry_date": expired, "is_permanent": 1})],
            )
            .await
            .unwrap();

        assert_eq!(opt.vip_status(1).await.unwrap(), None);
        assert!(!tmp.path().join("vip_users").join("1.json").exists());

        let status = opt.vip_status(2).await.unwrap().unwrap();
        assert!(status.is_vip);
        assert!(!status.is_permanent);

        assert!(opt.vip_status(3).await.unwrap().unwrap().is_permanent);
        assert_eq!(opt.vip_status(4).await.unwrap(), None);
    }
}
