// LogPulse - core/sites.rs
//
// Website configuration provider contract and the static implementation
// built from config.toml.

use crate::core::model::SiteConfig;

/// Read-only lookup of configured websites.
pub trait SiteDirectory: Send + Sync {
    /// Every configured site id, in scan order.
    fn site_ids(&self) -> Vec<String>;

    fn site(&self, id: &str) -> Option<SiteConfig>;
}

/// Fixed list of sites, scanned in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StaticSiteDirectory {
    sites: Vec<SiteConfig>,
}

impl StaticSiteDirectory {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self { sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl SiteDirectory for StaticSiteDirectory {
    fn site_ids(&self) -> Vec<String> {
        self.sites.iter().map(|s| s.id.clone()).collect()
    }

    fn site(&self, id: &str) -> Option<SiteConfig> {
        self.sites.iter().find(|s| s.id == id).cloned()
    }
}
