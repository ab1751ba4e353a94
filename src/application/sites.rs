//! Sites served by this instance, addressable by legacy prefix or by domain.

use std::sync::Arc;

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Legacy path prefix, e.g. `enwiki`.
    pub prefix: String,
    /// Public domain used by versioned routes, e.g. `en.example.org`.
    pub domain: String,
    /// Base URL of the site's content API. Absent for local-only sites.
    pub api_url: Option<Url>,
}

impl Site {
    pub fn new(prefix: impl Into<String>, domain: impl Into<String>, api_url: Option<Url>) -> Self {
        Self {
            prefix: prefix.into(),
            domain: domain.into(),
            api_url,
        }
    }

    /// Base for relative links inside rendered documents.
    pub fn base_href(&self) -> String {
        format!("//{}/wiki/", self.domain)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Arc<Site>>,
}

impl SiteRegistry {
    pub fn new(sites: impl IntoIterator<Item = Site>) -> Self {
        Self {
            sites: sites.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<Arc<Site>> {
        self.sites
            .iter()
            .find(|site| site.prefix == prefix)
            .cloned()
    }

    pub fn by_domain(&self, domain: &str) -> Option<Arc<Site>> {
        self.sites
            .iter()
            .find(|site| site.domain.eq_ignore_ascii_case(domain))
            .cloned()
    }

    /// The site listed first in configuration.
    pub fn first(&self) -> Option<Arc<Site>> {
        self.sites.first().cloned()
    }
}
