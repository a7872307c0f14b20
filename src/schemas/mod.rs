//! Request / response DTOs for the HTTP surface.

pub mod assets;
pub mod releases;
pub mod rollback;
pub mod runtimes;
pub mod tracking;
pub mod upload;
