// Site service - Use case for listing and resolving monitoring sites
use crate::application::error::RequestError;
use crate::domain::site::Site;
use std::sync::Arc;

#[derive(Clone)]
pub struct SiteService {
    sites: Arc<Vec<Site>>,
}

impl SiteService {
    pub fn new(sites: Vec<Site>) -> Self {
        Self {
            sites: Arc::new(sites),
        }
    }

    pub fn list_sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn find_site(&self, site_id: &str) -> Result<&Site, RequestError> {
        self.sites
            .iter()
            .find(|s| s.site_id == site_id)
            .ok_or_else(|| RequestError::UnknownSite(site_id.to_string()))
    }
}
