//! HTTP handlers

pub mod assignments;
pub mod audit;
pub mod health;
pub mod metrics;
pub mod permissions;
pub mod roles;
pub mod users;
