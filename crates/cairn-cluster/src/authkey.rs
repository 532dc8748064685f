use std::fs;

use sha2::{Digest, Sha256};

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// This host's peer auth key: `SHA-256(hostname ‖ machine_id)`, hex-encoded.
///
/// Reads `/etc/machine-id`, falling back to the dbus location. Targets the
/// Linux-deployed fleet the rest of the stack assumes; no macOS
/// hardware-UUID path, since nothing else in this crate touches
/// platform-specific APIs.
pub fn compute_auth_key() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    let machine_id = read_machine_id().unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(machine_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn read_machine_id() -> Option<String> {
    for path in MACHINE_ID_PATHS {
        if let Ok(contents) = fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_key_is_deterministic_hex_sha256() {
        let a = compute_auth_key();
        let b = compute_auth_key();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
