//! Effective policy resolution
//!
//! An account's service attributes come from two places: values stored on
//! the account itself and the billing profile it references. Resolution for
//! every attribute follows the same order:
//!
//! 1. A set override on the account (non-zero number, or a string that is
//!    neither empty nor `"NA"`) always wins.
//! 2. Otherwise, a dynamically linked account reads the live profile value
//!    through the [`ProfileCache`]. If the profile cannot be loaded the
//!    failure is logged and the account's own value is used.
//! 3. Otherwise the account's own (unset) value is returned.
//!
//! MAC and VLAN binding add one rule on top: a binding flag of 0 together
//! with a concrete MAC address (or VLAN tag) is an explicit opt-out and
//! resolves to disabled in every mode.
//!
//! | bind flag | value set | mode    | profile flag | result |
//! |-----------|-----------|---------|--------------|--------|
//! | 1         | any       | any     | any          | 1      |
//! | 0         | yes       | any     | any          | 0      |
//! | 0         | no        | dynamic | 1            | 1      |
//! | 0         | no        | dynamic | 0            | 0      |
//! | 0         | no        | static  | any          | 0      |

use crate::error::Result;
use crate::model::{is_unset, Account, Profile, ProfileLinkMode};
use crate::profile_cache::ProfileCache;
use crate::store::AccountStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// All resolved attributes for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub up_rate: i64,
    pub down_rate: i64,
    pub active_num: i32,
    pub addr_pool: String,
    pub domain: String,
    pub ipv6_prefix_pool: String,
    pub bind_mac: i32,
    pub bind_vlan: i32,
}

impl Account {
    /// Load the profile when this account resolves dynamically.
    ///
    /// Returns `None` for static accounts, when no cache is supplied, or
    /// when the lookup fails (logged).
    async fn linked_profile(
        &self,
        cache: Option<&ProfileCache>,
        attribute: &'static str,
    ) -> Option<Profile> {
        if self.profile_link_mode != ProfileLinkMode::Dynamic {
            return None;
        }
        let cache = cache?;
        match cache.get(self.profile_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(
                    username = %self.username,
                    profile_id = self.profile_id,
                    attribute,
                    error = %e,
                    "Profile lookup failed, falling back to account value"
                );
                None
            }
        }
    }

    fn up_rate_from(&self, profile: Option<&Profile>) -> i64 {
        match profile {
            Some(p) if self.up_rate == 0 => p.up_rate,
            _ => self.up_rate,
        }
    }

    fn down_rate_from(&self, profile: Option<&Profile>) -> i64 {
        match profile {
            Some(p) if self.down_rate == 0 => p.down_rate,
            _ => self.down_rate,
        }
    }

    fn active_num_from(&self, profile: Option<&Profile>) -> i32 {
        match profile {
            Some(p) if self.active_num == 0 => p.active_num,
            _ => self.active_num,
        }
    }

    fn addr_pool_from(&self, profile: Option<&Profile>) -> String {
        text_from(&self.addr_pool, profile.map(|p| p.addr_pool.as_str()))
    }

    fn domain_from(&self, profile: Option<&Profile>) -> String {
        text_from(&self.domain, profile.map(|p| p.domain.as_str()))
    }

    fn ipv6_prefix_pool_from(&self, profile: Option<&Profile>) -> String {
        text_from(
            &self.ipv6_prefix_pool,
            profile.map(|p| p.ipv6_prefix_pool.as_str()),
        )
    }

    fn bind_mac_from(&self, profile: Option<&Profile>) -> i32 {
        binding_from(self.bind_mac, self.has_mac(), profile.map(|p| p.bind_mac))
    }

    fn bind_vlan_from(&self, profile: Option<&Profile>) -> i32 {
        binding_from(self.bind_vlan, self.has_vlan(), profile.map(|p| p.bind_vlan))
    }

    /// Upload rate in Kbps
    pub async fn effective_up_rate(&self, cache: Option<&ProfileCache>) -> i64 {
        if self.up_rate != 0 {
            return self.up_rate;
        }
        let profile = self.linked_profile(cache, "up_rate").await;
        self.up_rate_from(profile.as_ref())
    }

    /// Download rate in Kbps
    pub async fn effective_down_rate(&self, cache: Option<&ProfileCache>) -> i64 {
        if self.down_rate != 0 {
            return self.down_rate;
        }
        let profile = self.linked_profile(cache, "down_rate").await;
        self.down_rate_from(profile.as_ref())
    }

    /// Concurrent session limit, 0 = unlimited
    pub async fn effective_active_num(&self, cache: Option<&ProfileCache>) -> i32 {
        if self.active_num != 0 {
            return self.active_num;
        }
        let profile = self.linked_profile(cache, "active_num").await;
        self.active_num_from(profile.as_ref())
    }

    pub async fn effective_addr_pool(&self, cache: Option<&ProfileCache>) -> String {
        if !is_unset(&self.addr_pool) {
            return self.addr_pool.clone();
        }
        let profile = self.linked_profile(cache, "addr_pool").await;
        self.addr_pool_from(profile.as_ref())
    }

    pub async fn effective_domain(&self, cache: Option<&ProfileCache>) -> String {
        if !is_unset(&self.domain) {
            return self.domain.clone();
        }
        let profile = self.linked_profile(cache, "domain").await;
        self.domain_from(profile.as_ref())
    }

    pub async fn effective_ipv6_prefix_pool(&self, cache: Option<&ProfileCache>) -> String {
        if !is_unset(&self.ipv6_prefix_pool) {
            return self.ipv6_prefix_pool.clone();
        }
        let profile = self.linked_profile(cache, "ipv6_prefix_pool").await;
        self.ipv6_prefix_pool_from(profile.as_ref())
    }

    /// 1 if the session must come from the account's MAC address, else 0
    pub async fn effective_bind_mac(&self, cache: Option<&ProfileCache>) -> i32 {
        if self.bind_mac != 0 || self.has_mac() {
            return self.bind_mac_from(None);
        }
        let profile = self.linked_profile(cache, "bind_mac").await;
        self.bind_mac_from(profile.as_ref())
    }

    /// 1 if the session must come from the account's VLAN tags, else 0
    pub async fn effective_bind_vlan(&self, cache: Option<&ProfileCache>) -> i32 {
        if self.bind_vlan != 0 || self.has_vlan() {
            return self.bind_vlan_from(None);
        }
        let profile = self.linked_profile(cache, "bind_vlan").await;
        self.bind_vlan_from(profile.as_ref())
    }

    /// Resolve every attribute, fetching the profile at most once.
    pub async fn effective_policy(&self, cache: Option<&ProfileCache>) -> EffectivePolicy {
        let profile = if self.needs_profile() {
            self.linked_profile(cache, "policy").await
        } else {
            None
        };
        let profile = profile.as_ref();

        EffectivePolicy {
            up_rate: self.up_rate_from(profile),
            down_rate: self.down_rate_from(profile),
            active_num: self.active_num_from(profile),
            addr_pool: self.addr_pool_from(profile),
            domain: self.domain_from(profile),
            ipv6_prefix_pool: self.ipv6_prefix_pool_from(profile),
            bind_mac: self.bind_mac_from(profile),
            bind_vlan: self.bind_vlan_from(profile),
        }
    }

    /// Whether any attribute would be read from the profile
    fn needs_profile(&self) -> bool {
        self.up_rate == 0
            || self.down_rate == 0
            || self.active_num == 0
            || is_unset(&self.addr_pool)
            || is_unset(&self.domain)
            || is_unset(&self.ipv6_prefix_pool)
            || (self.bind_mac == 0 && !self.has_mac())
            || (self.bind_vlan == 0 && !self.has_vlan())
    }

    /// Copy every unset attribute from `profile` into the account.
    ///
    /// Binding flags are copied only when the account neither enables the
    /// binding nor carries a value to bind to.
    pub fn snapshot_from_profile(&mut self, profile: &Profile) {
        if self.up_rate == 0 {
            self.up_rate = profile.up_rate;
        }
        if self.down_rate == 0 {
            self.down_rate = profile.down_rate;
        }
        if self.active_num == 0 {
            self.active_num = profile.active_num;
        }
        if is_unset(&self.addr_pool) {
            self.addr_pool = profile.addr_pool.clone();
        }
        if is_unset(&self.domain) {
            self.domain = profile.domain.clone();
        }
        if is_unset(&self.ipv6_prefix_pool) {
            self.ipv6_prefix_pool = profile.ipv6_prefix_pool.clone();
        }
        if self.bind_mac == 0 && !self.has_mac() {
            self.bind_mac = profile.bind_mac;
        }
        if self.bind_vlan == 0 && !self.has_vlan() {
            self.bind_vlan = profile.bind_vlan;
        }
    }

    /// Change the linkage mode.
    ///
    /// Going from dynamic to static snapshots the current profile into every
    /// unset attribute first, so static reads keep returning the values the
    /// account was effectively using. If the profile cannot be loaded the
    /// account is left unchanged and the error is returned.
    pub async fn switch_link_mode(
        &mut self,
        mode: ProfileLinkMode,
        cache: &ProfileCache,
    ) -> Result<()> {
        if self.profile_link_mode == mode {
            return Ok(());
        }

        if self.profile_link_mode == ProfileLinkMode::Dynamic && mode == ProfileLinkMode::Static {
            let profile = cache.get(self.profile_id).await?;
            self.snapshot_from_profile(&profile);
        }

        self.profile_link_mode = mode;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Point the account at another profile and invalidate both cache entries.
    pub fn reassign_profile(&mut self, new_profile_id: i64, cache: &ProfileCache) {
        let old_profile_id = self.profile_id;
        self.profile_id = new_profile_id;
        self.updated_at = Utc::now();
        cache.invalidate_reassignment(old_profile_id, new_profile_id);
    }
}

/// Load an account, change its linkage mode and persist it.
pub async fn apply_link_mode(
    accounts: &dyn AccountStore,
    cache: &ProfileCache,
    username: &str,
    mode: ProfileLinkMode,
) -> Result<Account> {
    let mut account = accounts.get_account(username).await?;
    let previous = account.profile_link_mode;
    account.switch_link_mode(mode, cache).await?;
    if previous != mode {
        accounts.upsert_account(&account).await?;
        info!(username, from = %previous, to = %mode, "Account link mode changed");
    }
    Ok(account)
}

fn text_from(own: &str, profile: Option<&str>) -> String {
    match profile {
        Some(value) if is_unset(own) => value.to_string(),
        _ => own.to_string(),
    }
}

fn binding_from(flag: i32, has_value: bool, profile_flag: Option<i32>) -> i32 {
    if flag != 0 {
        return 1;
    }
    if has_value {
        // Explicit opt-out
        return 0;
    }
    match profile_flag {
        Some(f) if f != 0 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ProfileStore};
    use std::sync::Arc;
    use std::time::Duration;

    async fn cache_with(profile: Profile) -> ProfileCache {
        let store = Arc::new(MemoryStore::new());
        store.upsert_profile(&profile).await.unwrap();
        ProfileCache::without_sweeper(store, Duration::from_secs(60))
    }

    fn empty_cache() -> ProfileCache {
        ProfileCache::without_sweeper(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    fn gold() -> Profile {
        let mut p = Profile::new(1, "gold");
        p.up_rate = 10240;
        p.down_rate = 20480;
        p.active_num = 2;
        p.addr_pool = "pool-gold".into();
        p.domain = "gold.example".into();
        p.ipv6_prefix_pool = "v6-gold".into();
        p
    }

    fn dynamic_account() -> Account {
        Account::new(10, "alice", 1).with_link_mode(ProfileLinkMode::Dynamic)
    }

    #[tokio::test]
    async fn test_dynamic_reads_profile() {
        let cache = cache_with(gold()).await;
        let account = dynamic_account();

        assert_eq!(account.effective_up_rate(Some(&cache)).await, 10240);
        assert_eq!(account.effective_down_rate(Some(&cache)).await, 20480);
        assert_eq!(account.effective_active_num(Some(&cache)).await, 2);
        assert_eq!(account.effective_addr_pool(Some(&cache)).await, "pool-gold");
        assert_eq!(account.effective_domain(Some(&cache)).await, "gold.example");
        assert_eq!(
            account.effective_ipv6_prefix_pool(Some(&cache)).await,
            "v6-gold"
        );
    }

    #[tokio::test]
    async fn test_override_wins_in_every_mode() {
        let cache = cache_with(gold()).await;
        for mode in [ProfileLinkMode::Static, ProfileLinkMode::Dynamic] {
            let mut account = Account::new(10, "alice", 1).with_link_mode(mode);
            account.up_rate = 5120;
            account.addr_pool = "pool-own".into();

            assert_eq!(account.effective_up_rate(Some(&cache)).await, 5120);
            assert_eq!(account.effective_up_rate(None).await, 5120);
            assert_eq!(account.effective_addr_pool(Some(&cache)).await, "pool-own");
        }
    }

    #[tokio::test]
    async fn test_na_sentinel_is_unset() {
        let cache = cache_with(gold()).await;
        let mut account = dynamic_account();
        account.domain = "NA".into();
        assert_eq!(account.effective_domain(Some(&cache)).await, "gold.example");
    }

    #[tokio::test]
    async fn test_static_ignores_profile() {
        let cache = cache_with(gold()).await;
        let account = Account::new(10, "alice", 1);
        assert_eq!(account.effective_up_rate(Some(&cache)).await, 0);
        assert_eq!(account.effective_addr_pool(Some(&cache)).await, "");
    }

    #[tokio::test]
    async fn test_dynamic_without_cache_uses_account() {
        let account = dynamic_account();
        assert_eq!(account.effective_up_rate(None).await, 0);
        assert_eq!(account.effective_domain(None).await, "");
    }

    #[tokio::test]
    async fn test_missing_profile_falls_back() {
        let cache = empty_cache();
        let mut account = dynamic_account();
        account.addr_pool = "NA".into();

        assert_eq!(account.effective_up_rate(Some(&cache)).await, 0);
        assert_eq!(account.effective_addr_pool(Some(&cache)).await, "NA");
        assert_eq!(account.effective_bind_mac(Some(&cache)).await, 0);
    }

    #[tokio::test]
    async fn test_bind_mac_truth_table() {
        for (flag, mac, mode, profile_flag, expected) in [
            (1, "", ProfileLinkMode::Static, 0, 1),
            (1, "aa:bb:cc:dd:ee:ff", ProfileLinkMode::Dynamic, 0, 1),
            (0, "aa:bb:cc:dd:ee:ff", ProfileLinkMode::Dynamic, 1, 0),
            (0, "aa:bb:cc:dd:ee:ff", ProfileLinkMode::Static, 1, 0),
            (0, "", ProfileLinkMode::Dynamic, 1, 1),
            (0, "", ProfileLinkMode::Dynamic, 0, 0),
            (0, "", ProfileLinkMode::Static, 1, 0),
            (0, "NA", ProfileLinkMode::Dynamic, 1, 1),
        ] {
            let mut profile = gold();
            profile.bind_mac = profile_flag;
            let cache = cache_with(profile).await;

            let mut account = Account::new(10, "alice", 1).with_link_mode(mode);
            account.bind_mac = flag;
            account.mac_addr = mac.into();

            assert_eq!(
                account.effective_bind_mac(Some(&cache)).await,
                expected,
                "flag={} mac={:?} mode={} profile={}",
                flag,
                mac,
                mode,
                profile_flag
            );
            assert_eq!(
                account.effective_policy(Some(&cache)).await.bind_mac,
                expected
            );
        }
    }

    #[tokio::test]
    async fn test_bind_vlan_truth_table() {
        for (flag, vlan, mode, profile_flag, expected) in [
            (1, 0, ProfileLinkMode::Static, 0, 1),
            (0, 100, ProfileLinkMode::Dynamic, 1, 0),
            (0, 100, ProfileLinkMode::Static, 1, 0),
            (0, 0, ProfileLinkMode::Dynamic, 1, 1),
            (0, 0, ProfileLinkMode::Dynamic, 0, 0),
            (0, 0, ProfileLinkMode::Static, 1, 0),
        ] {
            let mut profile = gold();
            profile.bind_vlan = profile_flag;
            let cache = cache_with(profile).await;

            let mut account = Account::new(10, "alice", 1).with_link_mode(mode);
            account.bind_vlan = flag;
            account.vlan_id2 = vlan;

            assert_eq!(account.effective_bind_vlan(Some(&cache)).await, expected);
        }
    }

    #[tokio::test]
    async fn test_effective_policy_single_fetch() {
        let cache = cache_with(gold()).await;
        let mut account = dynamic_account();
        account.down_rate = 1;

        let policy = account.effective_policy(Some(&cache)).await;
        assert_eq!(policy.up_rate, 10240);
        assert_eq!(policy.down_rate, 1);
        assert_eq!(policy.addr_pool, "pool-gold");
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_switch_to_static_snapshots_profile() {
        let mut profile = gold();
        profile.bind_mac = 1;
        let cache = cache_with(profile).await;
        let mut account = dynamic_account();
        account.up_rate = 5120;

        account
            .switch_link_mode(ProfileLinkMode::Static, &cache)
            .await
            .unwrap();

        assert_eq!(account.profile_link_mode, ProfileLinkMode::Static);
        assert_eq!(account.up_rate, 5120);
        assert_eq!(account.down_rate, 20480);
        assert_eq!(account.addr_pool, "pool-gold");
        assert_eq!(account.bind_mac, 1);
        // Static reads keep the values that were effective before
        assert_eq!(account.effective_down_rate(None).await, 20480);
        assert_eq!(account.effective_bind_mac(None).await, 1);
    }

    #[tokio::test]
    async fn test_switch_to_static_fails_without_profile() {
        let cache = empty_cache();
        let mut account = dynamic_account();
        let before = account.clone();

        let err = account
            .switch_link_mode(ProfileLinkMode::Static, &cache)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(account, before);
    }

    #[tokio::test]
    async fn test_switch_to_dynamic_keeps_values() {
        let cache = empty_cache();
        let mut account = Account::new(10, "alice", 1);
        account.up_rate = 64;

        account
            .switch_link_mode(ProfileLinkMode::Dynamic, &cache)
            .await
            .unwrap();
        assert_eq!(account.profile_link_mode, ProfileLinkMode::Dynamic);
        assert_eq!(account.up_rate, 64);
    }

    #[tokio::test]
    async fn test_reassign_profile_invalidates_both() {
        let cache = cache_with(gold()).await;
        cache.set(2, Profile::new(2, "silver"));
        cache.get(1).await.unwrap();
        assert_eq!(cache.stats().entries, 2);

        let mut account = dynamic_account();
        account.reassign_profile(2, &cache);
        assert_eq!(account.profile_id, 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_apply_link_mode_persists() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_profile(&gold()).await.unwrap();
        store.upsert_account(&dynamic_account()).await.unwrap();
        let cache = ProfileCache::without_sweeper(store.clone(), Duration::from_secs(60));

        let account = apply_link_mode(store.as_ref(), &cache, "alice", ProfileLinkMode::Static)
            .await
            .unwrap();
        assert_eq!(account.up_rate, 10240);

        let stored = store.get_account("alice").await.unwrap();
        assert_eq!(stored.profile_link_mode, ProfileLinkMode::Static);
        assert_eq!(stored.up_rate, 10240);
    }
}
