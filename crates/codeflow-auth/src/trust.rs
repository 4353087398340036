//! Redirect trust.
//!
//! The flow asks a [`TrustedDomainResolver`] whether a redirect URI may
//! receive authorization results. The answer can change at any time, so the
//! flow asks again at exchange time instead of remembering the first answer.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

/// Decides whether a redirect target is allow-listed.
pub trait TrustedDomainResolver: Send + Sync {
    /// Returns `true` if `uri` points at a trusted host.
    fn is_trusted_domain(&self, uri: &Url) -> bool;
}

/// Host allow-list with runtime replacement.
///
/// Entries are either exact hosts (`app.example`) or wildcard suffixes
/// (`*.example.com`). A wildcard matches subdomains only, not the bare
/// suffix. Matching is ASCII case-insensitive since hosts are.
#[derive(Debug, Default)]
pub struct AllowListDomainResolver {
    domains: ArcSwap<BTreeSet<String>>,
}

impl AllowListDomainResolver {
    /// Creates a resolver from host entries.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: ArcSwap::from_pointee(normalize(domains)),
        }
    }

    /// Replaces the whole allow-list.
    pub fn set_domains<I, S>(&self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.domains.store(Arc::new(normalize(domains)));
    }

    /// Adds a single entry.
    pub fn add_domain(&self, domain: &str) {
        let domain = domain.trim().to_ascii_lowercase();
        self.domains.rcu(|current| {
            let mut next = BTreeSet::clone(current);
            next.insert(domain.clone());
            next
        });
    }

    /// Removes a single entry.
    pub fn remove_domain(&self, domain: &str) {
        let domain = domain.trim().to_ascii_lowercase();
        self.domains.rcu(|current| {
            let mut next = BTreeSet::clone(current);
            next.remove(&domain);
            next
        });
    }

    /// Returns the current entries.
    #[must_use]
    pub fn domains(&self) -> Vec<String> {
        self.domains.load().iter().cloned().collect()
    }
}

impl TrustedDomainResolver for AllowListDomainResolver {
    fn is_trusted_domain(&self, uri: &Url) -> bool {
        let Some(host) = uri.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domains = self.domains.load();

        domains.iter().any(|entry| match entry.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
            None => *entry == host,
        })
    }
}

fn normalize<I, S>(domains: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    domains
        .into_iter()
        .map(|d| d.as_ref().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_exact_host() {
        let resolver = AllowListDomainResolver::new(["app.example"]);
        assert!(resolver.is_trusted_domain(&url("https://app.example/callback")));
        assert!(resolver.is_trusted_domain(&url("https://APP.example:8443/cb")));
        assert!(!resolver.is_trusted_domain(&url("https://evil.app.example/cb")));
        assert!(!resolver.is_trusted_domain(&url("https://app.example.evil/cb")));
    }

    #[test]
    fn test_wildcard_suffix() {
        let resolver = AllowListDomainResolver::new(["*.example.com"]);
        assert!(resolver.is_trusted_domain(&url("https://a.example.com/")));
        assert!(resolver.is_trusted_domain(&url("https://a.b.example.com/")));
        assert!(!resolver.is_trusted_domain(&url("https://example.com/")));
        assert!(!resolver.is_trusted_domain(&url("https://badexample.com/")));
    }

    #[test]
    fn test_url_without_host() {
        let resolver = AllowListDomainResolver::new(["app.example"]);
        assert!(!resolver.is_trusted_domain(&url("file:///etc/passwd")));
    }

    #[test]
    fn test_runtime_revocation() {
        let resolver = AllowListDomainResolver::new(["app.example", "other.example"]);
        let callback = url("https://app.example/callback");
        assert!(resolver.is_trusted_domain(&callback));

        resolver.remove_domain("APP.example");
        assert!(!resolver.is_trusted_domain(&callback));
        assert_eq!(resolver.domains(), vec!["other.example".to_string()]);

        resolver.add_domain("app.example");
        assert!(resolver.is_trusted_domain(&callback));

        resolver.set_domains(Vec::<String>::new());
        assert!(!resolver.is_trusted_domain(&callback));
    }
}
