//! Infrastructure layer - upstream client, storage, crypto and services

pub mod auth;
pub mod logging;
pub mod redemption;
pub mod storage;
pub mod team;
pub mod upstream;
pub mod vault;
pub mod warranty;
