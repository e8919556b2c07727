//! Blocking rtnetlink implementation for the route and rule tables.
//!
//! Only the requests the reconciler needs are implemented: adding and
//! deleting routes, adding, deleting and dumping policy rules. Each request
//! waits for the kernel's ACK before returning.
//!
//! ```ignore
//! use nodenet::host::RuleTable;
//! use nodenet::netlink::Connection;
//! use nodenet::types::AddressFamily;
//!
//! let conn = Connection::new()?;
//! for rule in conn.list_rules(AddressFamily::Inet)? {
//!     println!("{rule}");
//! }
//! ```

pub mod attr;
mod builder;
pub mod connection;
pub mod message;
pub mod route;
pub mod rule;
mod socket;

pub use connection::Connection;
pub use rule::parse_rule;
