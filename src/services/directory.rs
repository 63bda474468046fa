//! Who may talk to the bot and who receives the daily summary.
//!
//! Admins come from the config allow-lists and are always trusted. Everyone
//! else must hold an approved row in the Users tab. Approval lookups are
//! cached for a short TTL so per-command checks do not hammer the Sheets
//! API, and a stale cache is better than locking everyone out when the API
//! is down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::io::sheets::{SheetsError, UserRegistry};

/// One resolved delivery target for a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub chat_id: i64,
    pub name: String,
}

struct CachedApprovals {
    ids: HashSet<i64>,
    fetched_at: Instant,
}

impl CachedApprovals {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.fetched_at) < ttl
    }
}

pub struct UserDirectory {
    /// None when Sheets is not configured. Approval checks then pass for
    /// everyone, which keeps a bare-token deployment usable.
    registry: Option<Arc<dyn UserRegistry>>,
    admin_ids: Vec<i64>,
    admin_usernames: Vec<String>,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedApprovals>>,
}

impl UserDirectory {
    pub fn new(
        registry: Option<Arc<dyn UserRegistry>>,
        admin_ids: Vec<i64>,
        admin_usernames: Vec<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self { registry, admin_ids, admin_usernames, cache_ttl, cache: Mutex::new(None) }
    }

    pub fn is_admin(&self, user_id: i64, username: Option<&str>) -> bool {
        if self.admin_ids.contains(&user_id) {
            return true;
        }
        username
            .map(|name| self.admin_usernames.iter().any(|admin| admin == &name.to_lowercase()))
            .unwrap_or(false)
    }

    pub async fn is_approved(&self, user_id: i64, username: Option<&str>) -> bool {
        if self.is_admin(user_id, username) {
            return true;
        }
        if self.registry.is_none() {
            return true;
        }
        self.approved_ids().await.contains(&user_id)
    }

    /// Approved user ids, refreshed from the registry when the cache has
    /// expired. A fetch failure falls back to the last good set; with no
    /// cache at all the set is empty and non-admins stay locked out.
    async fn approved_ids(&self) -> HashSet<i64> {
        let Some(registry) = &self.registry else {
            return HashSet::new();
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(Instant::now(), self.cache_ttl) {
                return cached.ids.clone();
            }
        }

        match registry.list_approved().await {
            Ok(users) => {
                let ids: HashSet<i64> = users.iter().map(|u| u.telegram_user_id).collect();
                debug!(count = ids.len(), "approvals_cache_refreshed");
                *cache = Some(CachedApprovals { ids: ids.clone(), fetched_at: Instant::now() });
                ids
            }
            Err(err) => match cache.as_ref() {
                Some(stale) => {
                    warn!(error = %err, "approvals_fetch_failed_using_stale_cache");
                    stale.ids.clone()
                }
                None => {
                    warn!(error = %err, "approvals_fetch_failed_no_cache");
                    HashSet::new()
                }
            },
        }
    }

    /// Resolves the broadcast list: every approved user with a chat id, plus
    /// any allow-listed admin who has registered. Deduplicated by chat id.
    pub async fn recipients(&self) -> Result<Vec<Recipient>, SheetsError> {
        let Some(registry) = &self.registry else {
            debug!("recipients_skipped_no_registry");
            return Ok(Vec::new());
        };

        let users = registry.list_all().await?;
        let mut seen: HashSet<i64> = HashSet::new();
        let mut recipients = Vec::new();

        for user in users.iter().filter(|u| u.is_approved()) {
            if let Some(chat_id) = user.telegram_chat_id {
                if seen.insert(chat_id) {
                    recipients.push(Recipient { chat_id, name: user.display_name() });
                }
            }
        }
        for user in
            users.iter().filter(|u| self.is_admin(u.telegram_user_id, u.telegram_username.as_deref()))
        {
            if let Some(chat_id) = user.telegram_chat_id {
                if seen.insert(chat_id) {
                    recipients
                        .push(Recipient { chat_id, name: format!("Admin: {}", user.display_name()) });
                }
            }
        }
        Ok(recipients)
    }
}
