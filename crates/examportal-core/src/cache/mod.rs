//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving portal
//! data locally. Data is cached in JSON format and considered stale after
//! 60 minutes.
//!
//! Cached data types include:
//! - The exam catalog
//! - Submitted applications, per account

pub mod manager;

pub use manager::{CacheManager, CachedData};
