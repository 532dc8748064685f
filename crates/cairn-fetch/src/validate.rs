use std::net::IpAddr;

use url::Url;

use crate::error::{FetchError, Result};

/// Validates a candidate URL against the fetch policy: scheme must be
/// http(s), host must not be an IP literal, and host must not match any
/// blacklist entry. Blacklist entries may be a bare host (`example.com`,
/// exact match) or a wildcard (`*.example.com`, matches any subdomain).
pub fn validate_url(url: &Url, blacklist: &[String]) -> Result<()> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::Blocked(format!("scheme {}", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| FetchError::InvalidUrl("missing host".to_string()))?;

    if host.parse::<IpAddr>().is_ok() {
        return Err(FetchError::Blocked("IP literal host".to_string()));
    }

    if is_blacklisted(host, blacklist) {
        return Err(FetchError::Blocked(format!("blacklisted host {host}")));
    }

    Ok(())
}

pub fn is_blacklisted(host: &str, blacklist: &[String]) -> bool {
    let host = host.to_lowercase();
    blacklist.iter().any(|entry| {
        let entry = entry.trim().to_lowercase();
        if entry.is_empty() {
            return false;
        }
        if let Some(suffix) = entry.strip_prefix("*.") {
            host == suffix || host.ends_with(&format!(".{suffix}"))
        } else {
            host == entry
        }
    })
}

/// Parses a comma-separated blacklist string from config into entries.
pub fn parse_blacklist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_blacklist_matches_subdomain() {
        let list = vec!["*.spam.example".to_string()];
        assert!(is_blacklisted("a.spam.example", &list));
        assert!(is_blacklisted("spam.example", &list));
        assert!(!is_blacklisted("notspam.example", &list));
    }

    #[test]
    fn ip_literal_is_blocked() {
        let url = Url::parse("http://127.0.0.1/x").unwrap();
        assert!(validate_url(&url, &[]).is_err());
    }
}
