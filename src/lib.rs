//! Ingestion, normalization and aggregation of French fire-and-rescue
//! (SDIS) intervention statistics.
//!
//! Data flows one way: raw bytes ([`loader`]) to a canonical table
//! ([`normalize`]), then to filtered views and grouped summaries
//! ([`aggregate`]) that the page reports ([`reports`]) format for display.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod reports;
pub mod repository;
pub mod schema;
pub mod types;
pub mod util;

pub use error::LoadError;
pub use repository::{Dataset, Repository};
pub use types::{CanonicalRow, CanonicalTable, FilterPredicate, NavigationState};
