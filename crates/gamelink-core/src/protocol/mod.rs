//! Text formats exchanged with peers and external processes.
//!
//! - [`pin`] – the `WHO_HAS_PIN` / `I_HAVE_PIN` UDP datagrams.
//! - [`announcement`] – semicolon-delimited service-announcement records.
//! - [`pairing`] – line predicates over the streaming client's pairing output.

pub mod announcement;
pub mod pairing;
pub mod pin;
