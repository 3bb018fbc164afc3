//! Application services: the orchestration layer between the HTTP surface
//! and the repositories, caches, and notification adapters.

pub mod error;
pub mod notify;
pub mod rankings;
pub mod reads;
pub mod recommend;
pub mod repos;
