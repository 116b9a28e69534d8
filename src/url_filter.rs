//! Content-security URL filtering
//!
//! Two ordered pattern lists decide whether the hosted page may load a target
//! address. The blacklist always wins; an empty whitelist means default-allow.
//! A trailing `*` turns a pattern into a prefix match, anything else matches
//! as a substring. All comparisons are case-insensitive.
//!
//! Validation runs at three points: before initialization, before explicit
//! navigation calls, and on every `NavigationStarting` event fired by the
//! rendering engine itself (covers in-page navigation the caller never saw).

use log::warn;

/// Allow/deny rule set applied to navigation targets.
#[derive(Debug, Clone, Default)]
pub struct UrlValidator {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl UrlValidator {
    pub fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist: whitelist.into_iter().map(|p| p.to_lowercase()).collect(),
            blacklist: blacklist.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Check a URL against the rule set. Blacklist entries block
    /// unconditionally; the whitelist only constrains when non-empty.
    pub fn is_allowed(&self, url: &str) -> bool {
        let url = url.to_lowercase();

        if self.blacklist.iter().any(|p| pattern_matches(p, &url)) {
            warn!("URL rejected by blacklist: {}", url);
            return false;
        }

        if self.whitelist.is_empty() {
            return true;
        }

        let allowed = self.whitelist.iter().any(|p| pattern_matches(p, &url));
        if !allowed {
            warn!("URL not covered by whitelist: {}", url);
        }
        allowed
    }
}

/// `"http://localhost*"` matches any URL starting with `http://localhost`;
/// a pattern without the wildcard matches as a substring.
fn pattern_matches(pattern: &str, url: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => url.starts_with(prefix),
        None => url.contains(pattern),
    }
}

/// Whether an address from untrusted page content may be handed to the OS
/// document-open mechanism. Only absolute web URLs qualify; anything else
/// (`file:`, app protocols, relative paths) stays inside the sandbox.
pub fn is_openable_web_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let v = UrlValidator::new(
            vec!["https://*".to_string()],
            vec!["https://evil.com*".to_string()],
        );
        assert!(!v.is_allowed("https://evil.com/x"));
        assert!(v.is_allowed("https://example.com/"));
    }

    #[test]
    fn test_empty_lists_default_allow() {
        let v = UrlValidator::default();
        assert!(v.is_allowed("https://anything.example/path?q=1"));
        assert!(v.is_allowed("file:///C:/wallpaper/index.html"));
    }

    #[test]
    fn test_wildcard_prefix_match() {
        let v = UrlValidator::new(vec!["http://localhost*".to_string()], vec![]);
        assert!(v.is_allowed("http://localhost:8080/page"));
        assert!(!v.is_allowed("http://example.com"));
    }

    #[test]
    fn test_plain_pattern_matches_substring() {
        let v = UrlValidator::new(vec![], vec!["tracker.example".to_string()]);
        assert!(!v.is_allowed("https://cdn.tracker.example/pixel.gif"));
        assert!(v.is_allowed("https://cdn.example.com/app.js"));
    }

    #[test]
    fn test_case_insensitive() {
        let v = UrlValidator::new(vec!["HTTPS://Good.Example*".to_string()], vec![]);
        assert!(v.is_allowed("https://good.example/page"));
        let v = UrlValidator::new(vec![], vec!["EVIL.COM".to_string()]);
        assert!(!v.is_allowed("https://evil.com/x"));
    }

    #[test]
    fn test_only_web_urls_are_openable() {
        assert!(is_openable_web_url("https://example.com/landing?x=1"));
        assert!(is_openable_web_url("http://localhost:3000/"));
        assert!(!is_openable_web_url("file:///C:/Windows/System32/calc.exe"));
        assert!(!is_openable_web_url("ms-settings:display"));
        assert!(!is_openable_web_url("not a url"));
        assert!(!is_openable_web_url("/relative/path"));
    }

    #[test]
    fn test_whitelist_constrains_when_non_empty() {
        let v = UrlValidator::new(vec!["https://allowed.example*".to_string()], vec![]);
        assert!(v.is_allowed("https://allowed.example/a"));
        assert!(!v.is_allowed("https://other.example/a"));
    }
}
