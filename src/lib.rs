//! Lettura: a self-hosted read-tracking and leaderboard service.
//!
//! The crate is layered the usual way: `domain` holds pure types and the
//! ranking math, `application` the services and repository ports, `cache`
//! the stale-while-revalidate facade, `infra` the Postgres, HTTP, and
//! Discord adapters, and `config` the layered settings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
