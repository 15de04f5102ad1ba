// Domain layer - Pure sensor comparison logic, no I/O
pub mod alignment;
pub mod comparison;
pub mod sample;
pub mod site;
pub mod statistics;
pub mod timeline;
