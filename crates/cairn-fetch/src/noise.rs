use url::Url;

/// A URL is "noise" when it points at hashtag listings or bare profile
/// pages rather than at content worth extracting facts from.
pub fn is_noise_url(raw: &str) -> bool {
    let url = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return true,
    };

    let path = url.path();
    let trimmed = path.trim_end_matches('/');

    if path.contains("/tags/") {
        return true;
    }
    if trimmed.is_empty() {
        return true;
    }

    let segments: Vec<&str> = trimmed.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        [single] if single.starts_with('@') => true,
        ["users", _user] => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_cases() {
        assert!(is_noise_url("https://example.com/tags/rust"));
        assert!(is_noise_url("https://example.com/@user"));
        assert!(is_noise_url("https://example.com/@user/"));
        assert!(is_noise_url("https://example.com/users/user"));
        assert!(is_noise_url("https://example.com/users/user/"));
        assert!(is_noise_url("https://example.com/"));
        assert!(is_noise_url("https://example.com"));
        assert!(is_noise_url("not a url"));
    }

    #[test]
    fn status_permalink_is_not_noise() {
        assert!(!is_noise_url("https://example.com/@user/12345"));
    }
}
