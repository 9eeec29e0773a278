//! Domain records shared by the core components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel some management tools write instead of leaving a field empty
pub const NOT_APPLICABLE: &str = "NA";

/// `true` when a textual attribute carries no usable value.
pub fn is_unset(value: &str) -> bool {
    value.is_empty() || value == NOT_APPLICABLE
}

/// How an account's unset attributes are resolved against its profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileLinkMode {
    /// Values were copied into the account and are authoritative
    #[default]
    Static,
    /// Unset values are read live from the profile
    Dynamic,
}

impl std::fmt::Display for ProfileLinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileLinkMode::Static => write!(f, "static"),
            ProfileLinkMode::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl std::str::FromStr for ProfileLinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" | "0" => Ok(ProfileLinkMode::Static),
            "dynamic" | "1" => Ok(ProfileLinkMode::Dynamic),
            other => Err(format!("unknown profile link mode: {}", other)),
        }
    }
}

/// Billing profile: the policy template accounts point at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Address pool name
    #[serde(default)]
    pub addr_pool: String,
    /// Concurrent session limit, 0 = unlimited
    #[serde(default)]
    pub active_num: i32,
    /// Upload rate in Kbps
    #[serde(default)]
    pub up_rate: i64,
    /// Download rate in Kbps
    #[serde(default)]
    pub down_rate: i64,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub ipv6_prefix_pool: String,
    #[serde(default)]
    pub bind_mac: i32,
    #[serde(default)]
    pub bind_vlan: i32,
    #[serde(default)]
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Profile {
            id,
            name: name.into(),
            status: "enabled".to_string(),
            addr_pool: String::new(),
            active_num: 0,
            up_rate: 0,
            down_rate: 0,
            domain: String::new(),
            ipv6_prefix_pool: String::new(),
            bind_mac: 0,
            bind_vlan: 0,
            remark: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Authenticating identity with per-account overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub profile_id: i64,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub profile_link_mode: ProfileLinkMode,
    #[serde(default)]
    pub addr_pool: String,
    #[serde(default)]
    pub active_num: i32,
    #[serde(default)]
    pub up_rate: i64,
    #[serde(default)]
    pub down_rate: i64,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub ipv6_prefix_pool: String,
    #[serde(default)]
    pub vlan_id1: i32,
    #[serde(default)]
    pub vlan_id2: i32,
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub bind_mac: i32,
    #[serde(default)]
    pub bind_vlan: i32,
    #[serde(default)]
    pub expire_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: i64, username: impl Into<String>, profile_id: i64) -> Self {
        let now = Utc::now();
        Account {
            id,
            username: username.into(),
            profile_id,
            realname: String::new(),
            status: "enabled".to_string(),
            profile_link_mode: ProfileLinkMode::Static,
            addr_pool: String::new(),
            active_num: 0,
            up_rate: 0,
            down_rate: 0,
            domain: String::new(),
            ipv6_prefix_pool: String::new(),
            vlan_id1: 0,
            vlan_id2: 0,
            mac_addr: String::new(),
            bind_mac: 0,
            bind_vlan: 0,
            expire_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style helper used by management code and tests
    pub fn with_link_mode(mut self, mode: ProfileLinkMode) -> Self {
        self.profile_link_mode = mode;
        self
    }

    pub fn has_mac(&self) -> bool {
        !is_unset(&self.mac_addr)
    }

    pub fn has_vlan(&self) -> bool {
        self.vlan_id1 != 0 || self.vlan_id2 != 0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.is_some_and(|t| t <= now)
    }
}

/// A live network session as reported by a NAS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineSession {
    /// Row identifier, assigned on create when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Acct-Session-Id; unique among online sessions
    pub acct_session_id: String,
    pub username: String,
    #[serde(default)]
    pub nas_addr: String,
    #[serde(default)]
    pub nas_id: String,
    #[serde(default)]
    pub nas_port_id: String,
    #[serde(default)]
    pub framed_ipaddr: String,
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub acct_session_time: u32,
    #[serde(default)]
    pub acct_input_total: u64,
    #[serde(default)]
    pub acct_output_total: u64,
    #[serde(default)]
    pub acct_input_packets: u32,
    #[serde(default)]
    pub acct_output_packets: u32,
    pub acct_start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl OnlineSession {
    pub fn new(acct_session_id: impl Into<String>, username: impl Into<String>) -> Self {
        let now = Utc::now();
        OnlineSession {
            id: None,
            acct_session_id: acct_session_id.into(),
            username: username.into(),
            nas_addr: String::new(),
            nas_id: String::new(),
            nas_port_id: String::new(),
            framed_ipaddr: String::new(),
            mac_addr: String::new(),
            acct_session_time: 0,
            acct_input_total: 0,
            acct_output_total: 0,
            acct_input_packets: 0,
            acct_output_packets: 0,
            acct_start_time: now,
            last_update: now,
        }
    }

    /// Whether this session was reported by the given NAS.
    ///
    /// An empty address or identifier never matches.
    pub fn belongs_to_nas(&self, nas_addr: &str, nas_id: &str) -> bool {
        (!nas_addr.is_empty() && self.nas_addr == nas_addr)
            || (!nas_id.is_empty() && self.nas_id == nas_id)
    }
}

/// Historical accounting row; open until a Stop closes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub acct_session_id: String,
    pub username: String,
    #[serde(default)]
    pub nas_addr: String,
    #[serde(default)]
    pub nas_id: String,
    #[serde(default)]
    pub nas_port_id: String,
    #[serde(default)]
    pub framed_ipaddr: String,
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub acct_session_time: u32,
    #[serde(default)]
    pub acct_input_total: u64,
    #[serde(default)]
    pub acct_output_total: u64,
    #[serde(default)]
    pub acct_input_packets: u32,
    #[serde(default)]
    pub acct_output_packets: u32,
    #[serde(default)]
    pub acct_terminate_cause: Option<u32>,
    pub acct_start_time: DateTime<Utc>,
    #[serde(default)]
    pub acct_stop_time: Option<DateTime<Utc>>,
}

impl AccountingRecord {
    pub fn is_open(&self) -> bool {
        self.acct_stop_time.is_none()
    }
}

impl From<&OnlineSession> for AccountingRecord {
    fn from(session: &OnlineSession) -> Self {
        AccountingRecord {
            id: None,
            acct_session_id: session.acct_session_id.clone(),
            username: session.username.clone(),
            nas_addr: session.nas_addr.clone(),
            nas_id: session.nas_id.clone(),
            nas_port_id: session.nas_port_id.clone(),
            framed_ipaddr: session.framed_ipaddr.clone(),
            mac_addr: session.mac_addr.clone(),
            acct_session_time: session.acct_session_time,
            acct_input_total: session.acct_input_total,
            acct_output_total: session.acct_output_total,
            acct_input_packets: session.acct_input_packets,
            acct_output_packets: session.acct_output_packets,
            acct_terminate_cause: None,
            acct_start_time: session.acct_start_time,
            acct_stop_time: None,
        }
    }
}
