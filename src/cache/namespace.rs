//! Cache namespaces and key composition

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Category of cached entity. Each namespace has its own TTL and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Namespace {
    UserRoles,
    ChatSettings,
    BanLists,
    ConversationMembers,
    VkUsers,
    UserNicknames,
    VipStatuses,
    TableExists,
    UserStats,
    Marriages,
    CommandAccess,
    CommandPriorities,
}

const MINUTE: u64 = 60;

impl Namespace {
    pub const ALL: [Namespace; 12] = [
        Namespace::UserRoles,
        Namespace::ChatSettings,
        Namespace::BanLists,
        Namespace::ConversationMembers,
        Namespace::VkUsers,
        Namespace::UserNicknames,
        Namespace::VipStatuses,
        Namespace::TableExists,
        Namespace::UserStats,
        Namespace::Marriages,
        Namespace::CommandAccess,
        Namespace::CommandPriorities,
    ];

    /// Built-in TTL, used unless the config overrides it
    pub fn default_ttl(self) -> Duration {
        let minutes = match self {
            Namespace::UserRoles => 5,
            Namespace::ChatSettings => 10,
            Namespace::BanLists => 2,
            Namespace::ConversationMembers => 15,
            Namespace::VkUsers => 30,
            Namespace::UserNicknames => 10,
            Namespace::VipStatuses => 20,
            Namespace::TableExists => 60,
            Namespace::UserStats => 3,
            Namespace::Marriages => 30,
            Namespace::CommandAccess => 5,
            Namespace::CommandPriorities => 5,
        };
        Duration::from_secs(minutes * MINUTE)
    }

    /// Name as it appears in config and stats output
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::UserRoles => "userRoles",
            Namespace::ChatSettings => "chatSettings",
            Namespace::BanLists => "banLists",
            Namespace::ConversationMembers => "conversationMembers",
            Namespace::VkUsers => "vkUsers",
            Namespace::UserNicknames => "userNicknames",
            Namespace::VipStatuses => "vipStatuses",
            Namespace::TableExists => "tableExists",
            Namespace::UserStats => "userStats",
            Namespace::Marriages => "marriages",
            Namespace::CommandAccess => "commandAccess",
            Namespace::CommandPriorities => "commandPriorities",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Separator between the parts of a composite key
pub const KEY_SEPARATOR: &str = "_";

/// Join key parts, e.g. `["100", "42"]` becomes `100_42`
pub fn compose_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Anything that can address a cache entry
pub trait CacheKey {
    fn cache_key(&self) -> String;
}

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl CacheKey for &str {
    fn cache_key(&self) -> String {
        (*self).to_string()
    }
}

macro_rules! integer_cache_key {
    ($($t:ty),*) => {
        $(
            impl CacheKey for $t {
                fn cache_key(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_cache_key!(i32, i64, u32, u64, usize);

impl<A: CacheKey, B: CacheKey> CacheKey for (A, B) {
    fn cache_key(&self) -> String {
        compose_key(&[self.0.cache_key(), self.1.cache_key()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        assert_eq!(Namespace::UserRoles.default_ttl(), Duration::from_millis(300_000));
        assert_eq!(Namespace::BanLists.default_ttl(), Duration::from_secs(120));
        assert_eq!(Namespace::TableExists.default_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_serde_names_match_display() {
        for ns in Namespace::ALL {
            let json = serde_json::to_value(ns).unwrap();
            assert_eq!(json, serde_json::Value::String(ns.to_string()));
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!(compose_key(&["100", "42"]), "100_42");
        assert_eq!((100i64, 42i64).cache_key(), "100_42");
        assert_eq!("peer".cache_key(), "peer");
        assert_eq!((String::from("a"), 7u32).cache_key(), "a_7");
    }
}
