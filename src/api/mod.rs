//! Operator HTTP API.

pub mod health;
pub mod routes;
