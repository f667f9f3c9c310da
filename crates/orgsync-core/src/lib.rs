//! OrgSync Core: domain models, error taxonomy, repository traits and
//! external gateway contracts shared by every OrgSync crate.

pub mod error;
pub mod gateway;
pub mod models;
pub mod repository;
