//! Network infrastructure for the host.
//!
//! - **`pin_announcer`** – Listens for `WHO_HAS_PIN` on IPv4 and IPv6 and
//!   replies to matching requests.  Runs on dedicated threads so blocking
//!   socket reads never touch the async runtime.

pub mod pin_announcer;
