//! Six-digit PIN generation.
//!
//! The PIN only has to be hard to guess for the few minutes it is on screen
//! and unique among the hosts on one LAN.  It is derived from a randomly
//! seeded hasher fed with the current time, the thread id, and a
//! per-process counter.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static PIN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a six-digit numeric PIN, zero-padded (e.g. `"004821"`).
pub fn generate_pin() -> String {
    let mut hasher = RandomState::new().build_hasher();
    SystemTime::now().hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    PIN_COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    let n = hasher.finish() % 1_000_000;
    format!("{n:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamelink_core::PinToken;
    use std::collections::HashSet;

    #[test]
    fn test_generated_pin_is_a_valid_token() {
        // Arrange / Act
        let pin = generate_pin();

        // Assert
        assert_eq!(pin.len(), 6);
        assert!(PinToken::parse(&pin).is_ok(), "pin {pin:?} must parse");
    }

    #[test]
    fn test_consecutive_pins_vary() {
        let pins: HashSet<String> = (0..20).map(|_| generate_pin()).collect();

        // Twenty draws from a million values should almost never collide.
        assert!(pins.len() >= 18, "too many repeats: {pins:?}");
    }
}
