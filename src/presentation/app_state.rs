// Application state for HTTP handlers
use crate::application::comparison_service::ComparisonService;
use crate::application::site_service::SiteService;

#[derive(Clone)]
pub struct AppState {
    pub site_service: SiteService,
    pub comparison_service: ComparisonService,
}
