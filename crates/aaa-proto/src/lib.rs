//! RADIUS accounting vocabulary for the AAA core
//!
//! This crate holds the protocol-level pieces the core shares with the
//! protocol bridge: accounting status and termination codes (RFC 2866),
//! the decoded request form, and exact 64-bit counter arithmetic for
//! wrapped octet counters (RFC 2869 gigawords).
//!
//! Packet encoding is not handled here; the bridge decodes packets into an
//! attribute map before the core sees them.
//!
//! # Example
//!
//! ```rust
//! use aaa_proto::{AcctRequest, AcctStatusType};
//! use std::collections::HashMap;
//!
//! let mut attrs = HashMap::new();
//! attrs.insert("Acct-Status-Type".to_string(), "Stop".to_string());
//! attrs.insert("Acct-Session-Id".to_string(), "0001".to_string());
//! attrs.insert("User-Name".to_string(), "alice".to_string());
//! attrs.insert("Acct-Input-Octets".to_string(), "1000".to_string());
//! attrs.insert("Acct-Input-Gigawords".to_string(), "2".to_string());
//!
//! let req = AcctRequest::from_attributes(&attrs).unwrap();
//! assert_eq!(req.status, AcctStatusType::Stop);
//! assert_eq!(req.input_total(), 8_589_935_592);
//! ```

pub mod accounting;
pub mod request;

pub use accounting::{AccountingError, AcctStatusType, AcctTerminateCause};
pub use request::{total_octets, AcctRequest, GIGAWORD};
