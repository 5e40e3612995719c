//! Application layer for the host.
//!
//! - **`pin_code`** – Generates the six-digit PIN shown to the user.

pub mod pin_code;
