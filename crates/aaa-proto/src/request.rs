//! Decoded accounting request form
//!
//! The protocol bridge decodes RADIUS packets into a flat attribute map
//! (dictionary name → textual value). [`AcctRequest`] is the typed view of
//! that map the core works with.
//!
//! Octet counters on the wire are 32-bit; RFC 2869 Acct-Input-Gigawords /
//! Acct-Output-Gigawords count how many times they wrapped. Totals are always
//! computed in 64-bit integer arithmetic.

use crate::accounting::{AccountingError, AcctStatusType, AcctTerminateCause};
use std::collections::HashMap;

/// Number of octets represented by one gigaword (2^32).
pub const GIGAWORD: u64 = 4 * 1024 * 1024 * 1024;

/// Combine a wrapped 32-bit octet counter with its gigaword counter.
///
/// ```rust
/// use aaa_proto::request::total_octets;
///
/// assert_eq!(total_octets(1000, 2), 8_589_935_592);
/// ```
pub fn total_octets(octets: u32, gigawords: u32) -> u64 {
    u64::from(octets) + u64::from(gigawords) * GIGAWORD
}

/// Typed accounting request as handed over by the protocol bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcctRequest {
    pub status: AcctStatusType,
    /// Acct-Session-Id (empty for NAS status requests)
    pub session_id: String,
    pub username: String,
    pub nas_addr: String,
    pub nas_id: String,
    pub nas_port_id: String,
    pub framed_ipaddr: String,
    /// Calling-Station-Id, normally the subscriber MAC
    pub mac_addr: String,
    pub session_time: u32,
    pub input_octets: u32,
    pub input_gigawords: u32,
    pub output_octets: u32,
    pub output_gigawords: u32,
    pub input_packets: u32,
    pub output_packets: u32,
    pub terminate_cause: Option<AcctTerminateCause>,
}

impl AcctRequest {
    /// Build a request with only the status set; everything else empty or zero.
    pub fn new(status: AcctStatusType) -> Self {
        AcctRequest {
            status,
            session_id: String::new(),
            username: String::new(),
            nas_addr: String::new(),
            nas_id: String::new(),
            nas_port_id: String::new(),
            framed_ipaddr: String::new(),
            mac_addr: String::new(),
            session_time: 0,
            input_octets: 0,
            input_gigawords: 0,
            output_octets: 0,
            output_gigawords: 0,
            input_packets: 0,
            output_packets: 0,
            terminate_cause: None,
        }
    }

    /// Interpret a decoded attribute map.
    ///
    /// Attribute names are matched case-insensitively. Session statuses
    /// require `Acct-Session-Id` and `User-Name`; NAS statuses require
    /// `NAS-IP-Address` or `NAS-Identifier`.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Result<Self, AccountingError> {
        let attrs: HashMap<String, &str> = attrs
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .collect();
        let text = |name: &str| -> String {
            attrs
                .get(&name.to_ascii_lowercase())
                .map(|v| v.to_string())
                .unwrap_or_default()
        };

        let raw_status = attrs
            .get("acct-status-type")
            .copied()
            .ok_or(AccountingError::MissingAttribute("Acct-Status-Type"))?;
        let status = AcctStatusType::parse(raw_status)
            .ok_or_else(|| AccountingError::InvalidStatusType(raw_status.to_string()))?;

        let mut req = AcctRequest::new(status);
        req.session_id = text("Acct-Session-Id");
        req.username = text("User-Name");
        req.nas_addr = text("NAS-IP-Address");
        req.nas_id = text("NAS-Identifier");
        req.nas_port_id = text("NAS-Port-Id");
        req.framed_ipaddr = text("Framed-IP-Address");
        req.mac_addr = text("Calling-Station-Id");

        req.session_time = counter(&attrs, "Acct-Session-Time")?;
        req.input_octets = counter(&attrs, "Acct-Input-Octets")?;
        req.input_gigawords = counter(&attrs, "Acct-Input-Gigawords")?;
        req.output_octets = counter(&attrs, "Acct-Output-Octets")?;
        req.output_gigawords = counter(&attrs, "Acct-Output-Gigawords")?;
        req.input_packets = counter(&attrs, "Acct-Input-Packets")?;
        req.output_packets = counter(&attrs, "Acct-Output-Packets")?;

        if let Some(cause) = attrs.get("acct-terminate-cause") {
            let parsed = AcctTerminateCause::parse(cause).ok_or_else(|| {
                AccountingError::InvalidAttributeValue {
                    attribute: "Acct-Terminate-Cause",
                    reason: format!("unknown cause '{}'", cause),
                }
            })?;
            req.terminate_cause = Some(parsed);
        }

        req.validate()?;
        Ok(req)
    }

    /// Check the attributes required for this status are present.
    pub fn validate(&self) -> Result<(), AccountingError> {
        if self.status.is_session_status() {
            if self.session_id.is_empty() {
                return Err(AccountingError::MissingAttribute("Acct-Session-Id"));
            }
            if self.username.is_empty() {
                return Err(AccountingError::MissingAttribute("User-Name"));
            }
        } else if self.nas_addr.is_empty() && self.nas_id.is_empty() {
            return Err(AccountingError::MissingAttribute("NAS-IP-Address"));
        }
        Ok(())
    }

    /// Input bytes including wrapped gigawords.
    pub fn input_total(&self) -> u64 {
        total_octets(self.input_octets, self.input_gigawords)
    }

    /// Output bytes including wrapped gigawords.
    pub fn output_total(&self) -> u64 {
        total_octets(self.output_octets, self.output_gigawords)
    }
}

fn counter(attrs: &HashMap<String, &str>, name: &'static str) -> Result<u32, AccountingError> {
    match attrs.get(&name.to_ascii_lowercase()) {
        None => Ok(0),
        Some(v) if v.is_empty() => Ok(0),
        Some(v) => v
            .parse::<u32>()
            .map_err(|e| AccountingError::InvalidAttributeValue {
                attribute: name,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_total_octets() {
        assert_eq!(total_octets(0, 0), 0);
        assert_eq!(total_octets(1000, 2), 1000 + 2 * 4_294_967_296);
        assert_eq!(total_octets(1000, 2), 8_589_935_592);
        assert_eq!(
            total_octets(u32::MAX, u32::MAX),
            u64::from(u32::MAX) + u64::from(u32::MAX) * 4_294_967_296
        );
    }

    #[test]
    fn test_from_attributes_start() {
        let req = AcctRequest::from_attributes(&attrs(&[
            ("Acct-Status-Type", "Start"),
            ("Acct-Session-Id", "abc-1"),
            ("User-Name", "alice"),
            ("NAS-IP-Address", "10.0.0.1"),
            ("Framed-IP-Address", "172.16.0.9"),
            ("Calling-Station-Id", "aa:bb:cc:dd:ee:ff"),
        ]))
        .unwrap();

        assert_eq!(req.status, AcctStatusType::Start);
        assert_eq!(req.session_id, "abc-1");
        assert_eq!(req.username, "alice");
        assert_eq!(req.nas_addr, "10.0.0.1");
        assert_eq!(req.mac_addr, "aa:bb:cc:dd:ee:ff");
        assert_eq!(req.input_total(), 0);
    }

    #[test]
    fn test_from_attributes_gigawords() {
        let req = AcctRequest::from_attributes(&attrs(&[
            ("acct-status-type", "2"),
            ("acct-session-id", "abc-1"),
            ("user-name", "alice"),
            ("Acct-Input-Octets", "1000"),
            ("Acct-Input-Gigawords", "2"),
            ("Acct-Output-Octets", "5"),
            ("Acct-Terminate-Cause", "User-Request"),
        ]))
        .unwrap();

        assert_eq!(req.status, AcctStatusType::Stop);
        assert_eq!(req.input_total(), 8_589_935_592);
        assert_eq!(req.output_total(), 5);
        assert_eq!(req.terminate_cause, Some(AcctTerminateCause::UserRequest));
    }

    #[test]
    fn test_from_attributes_missing_session_id() {
        let err = AcctRequest::from_attributes(&attrs(&[
            ("Acct-Status-Type", "Interim-Update"),
            ("User-Name", "alice"),
        ]))
        .unwrap_err();
        assert_eq!(err, AccountingError::MissingAttribute("Acct-Session-Id"));
    }

    #[test]
    fn test_from_attributes_nas_status_needs_nas() {
        let err =
            AcctRequest::from_attributes(&attrs(&[("Acct-Status-Type", "Accounting-On")]))
                .unwrap_err();
        assert_eq!(err, AccountingError::MissingAttribute("NAS-IP-Address"));

        let req = AcctRequest::from_attributes(&attrs(&[
            ("Acct-Status-Type", "Accounting-Off"),
            ("NAS-Identifier", "bras-1"),
        ]))
        .unwrap();
        assert_eq!(req.nas_id, "bras-1");
    }

    #[test]
    fn test_from_attributes_bad_counter() {
        let err = AcctRequest::from_attributes(&attrs(&[
            ("Acct-Status-Type", "Stop"),
            ("Acct-Session-Id", "abc-1"),
            ("User-Name", "alice"),
            ("Acct-Input-Octets", "4294967296"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            AccountingError::InvalidAttributeValue {
                attribute: "Acct-Input-Octets",
                ..
            }
        ));
    }

    #[test]
    fn test_from_attributes_unknown_status() {
        let err = AcctRequest::from_attributes(&attrs(&[("Acct-Status-Type", "Bogus")]))
            .unwrap_err();
        assert_eq!(err, AccountingError::InvalidStatusType("Bogus".to_string()));
    }
}
