//! RADIUS Accounting vocabulary (RFC 2866)
//!
//! Status and termination codes as they arrive from the protocol bridge,
//! plus the error type used when a decoded request cannot be interpreted.
//!
//! # Example
//!
//! ```rust
//! use aaa_proto::accounting::{AcctStatusType, AcctTerminateCause};
//!
//! let start = AcctStatusType::Start;
//! assert_eq!(start.as_u32(), 1);
//! assert_eq!(AcctStatusType::parse("Interim-Update"), Some(AcctStatusType::InterimUpdate));
//!
//! let cause = AcctTerminateCause::UserRequest;
//! assert_eq!(cause.as_u32(), 1);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accounting Status-Type values (RFC 2866 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AcctStatusType {
    /// Start (1) - Session has begun
    Start = 1,
    /// Stop (2) - Session has ended
    Stop = 2,
    /// Interim-Update (3) - Periodic update during session
    InterimUpdate = 3,
    /// Accounting-On (7) - NAS is ready
    AccountingOn = 7,
    /// Accounting-Off (8) - NAS is shutting down
    AccountingOff = 8,
}

impl AcctStatusType {
    /// Convert from u32 value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AcctStatusType::Start),
            2 => Some(AcctStatusType::Stop),
            3 => Some(AcctStatusType::InterimUpdate),
            7 => Some(AcctStatusType::AccountingOn),
            8 => Some(AcctStatusType::AccountingOff),
            _ => None,
        }
    }

    /// Parse the form a bridge sends: either the dictionary name
    /// (`"Start"`, `"Interim-Update"`, ...) or the numeric value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(n) = value.parse::<u32>() {
            return Self::from_u32(n);
        }
        match value.to_ascii_lowercase().as_str() {
            "start" => Some(AcctStatusType::Start),
            "stop" => Some(AcctStatusType::Stop),
            "interim-update" | "alive" => Some(AcctStatusType::InterimUpdate),
            "accounting-on" => Some(AcctStatusType::AccountingOn),
            "accounting-off" => Some(AcctStatusType::AccountingOff),
            _ => None,
        }
    }

    /// Convert to u32 value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if this is a session-related status (Start, Stop, Interim-Update)
    pub fn is_session_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::Start | AcctStatusType::Stop | AcctStatusType::InterimUpdate
        )
    }

    /// Check if this is a NAS status (Accounting-On, Accounting-Off)
    pub fn is_nas_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff
        )
    }
}

/// Acct-Terminate-Cause values (RFC 2866 Section 5.10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum AcctTerminateCause {
    UserRequest = 1,
    LostCarrier = 2,
    LostService = 3,
    IdleTimeout = 4,
    SessionTimeout = 5,
    AdminReset = 6,
    AdminReboot = 7,
    PortError = 8,
    NasError = 9,
    NasRequest = 10,
    NasReboot = 11,
    PortUnneeded = 12,
    PortPreempted = 13,
    PortSuspended = 14,
    ServiceUnavailable = 15,
    Callback = 16,
    UserError = 17,
    HostRequest = 18,
}

impl AcctTerminateCause {
    /// Convert from u32 value
    pub fn from_u32(value: u32) -> Option<Self> {
        use AcctTerminateCause::*;
        let cause = match value {
            1 => UserRequest,
            2 => LostCarrier,
            3 => LostService,
            4 => IdleTimeout,
            5 => SessionTimeout,
            6 => AdminReset,
            7 => AdminReboot,
            8 => PortError,
            9 => NasError,
            10 => NasRequest,
            11 => NasReboot,
            12 => PortUnneeded,
            13 => PortPreempted,
            14 => PortSuspended,
            15 => ServiceUnavailable,
            16 => Callback,
            17 => UserError,
            18 => HostRequest,
            _ => return None,
        };
        Some(cause)
    }

    /// Parse either the dictionary name (`"User-Request"`) or the numeric value.
    pub fn parse(value: &str) -> Option<Self> {
        use AcctTerminateCause::*;
        let value = value.trim();
        if let Ok(n) = value.parse::<u32>() {
            return Self::from_u32(n);
        }
        let cause = match value.to_ascii_lowercase().as_str() {
            "user-request" => UserRequest,
            "lost-carrier" => LostCarrier,
            "lost-service" => LostService,
            "idle-timeout" => IdleTimeout,
            "session-timeout" => SessionTimeout,
            "admin-reset" => AdminReset,
            "admin-reboot" => AdminReboot,
            "port-error" => PortError,
            "nas-error" => NasError,
            "nas-request" => NasRequest,
            "nas-reboot" => NasReboot,
            "port-unneeded" => PortUnneeded,
            "port-preempted" => PortPreempted,
            "port-suspended" => PortSuspended,
            "service-unavailable" => ServiceUnavailable,
            "callback" => Callback,
            "user-error" => UserError,
            "host-request" => HostRequest,
            _ => return None,
        };
        Some(cause)
    }

    /// Convert to u32 value
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Errors raised while interpreting a decoded accounting request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountingError {
    /// Missing required attribute
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// Invalid attribute value
    #[error("Invalid attribute value for {attribute}: {reason}")]
    InvalidAttributeValue {
        attribute: &'static str,
        reason: String,
    },

    /// Invalid status type
    #[error("Invalid Acct-Status-Type value: {0}")]
    InvalidStatusType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acct_status_type_conversion() {
        assert_eq!(AcctStatusType::Start.as_u32(), 1);
        assert_eq!(AcctStatusType::Stop.as_u32(), 2);
        assert_eq!(AcctStatusType::InterimUpdate.as_u32(), 3);
        assert_eq!(AcctStatusType::AccountingOn.as_u32(), 7);
        assert_eq!(AcctStatusType::AccountingOff.as_u32(), 8);

        assert_eq!(AcctStatusType::from_u32(1), Some(AcctStatusType::Start));
        assert_eq!(
            AcctStatusType::from_u32(8),
            Some(AcctStatusType::AccountingOff)
        );
        assert_eq!(AcctStatusType::from_u32(99), None);
    }

    #[test]
    fn test_acct_status_type_parse_names() {
        assert_eq!(AcctStatusType::parse("Start"), Some(AcctStatusType::Start));
        assert_eq!(AcctStatusType::parse("stop"), Some(AcctStatusType::Stop));
        assert_eq!(
            AcctStatusType::parse("Interim-Update"),
            Some(AcctStatusType::InterimUpdate)
        );
        assert_eq!(
            AcctStatusType::parse("Accounting-On"),
            Some(AcctStatusType::AccountingOn)
        );
        assert_eq!(AcctStatusType::parse(" 2 "), Some(AcctStatusType::Stop));
        assert_eq!(AcctStatusType::parse("Reboot"), None);
    }

    #[test]
    fn test_acct_status_type_categories() {
        assert!(AcctStatusType::Start.is_session_status());
        assert!(AcctStatusType::InterimUpdate.is_session_status());
        assert!(!AcctStatusType::AccountingOn.is_session_status());

        assert!(AcctStatusType::AccountingOff.is_nas_status());
        assert!(!AcctStatusType::Stop.is_nas_status());
    }

    #[test]
    fn test_acct_terminate_cause_conversion() {
        assert_eq!(AcctTerminateCause::IdleTimeout.as_u32(), 4);
        assert_eq!(
            AcctTerminateCause::from_u32(5),
            Some(AcctTerminateCause::SessionTimeout)
        );
        assert_eq!(
            AcctTerminateCause::parse("Admin-Reset"),
            Some(AcctTerminateCause::AdminReset)
        );
        assert_eq!(
            AcctTerminateCause::parse("11"),
            Some(AcctTerminateCause::NasReboot)
        );
        assert_eq!(AcctTerminateCause::from_u32(99), None);
    }
}
