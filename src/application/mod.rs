// Application layer - Use cases and repository seams
pub mod comparison_service;
pub mod error;
pub mod sensor_repository;
pub mod site_service;
