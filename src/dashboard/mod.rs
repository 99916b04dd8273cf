//! Repository dashboard.
//!
//! - **github**: read-only GitHub REST data source
//! - **summary**: status snapshot and its background loader
//! - **logtail**: incremental tail of the newest application log

pub mod github;
pub mod logtail;
pub mod summary;
