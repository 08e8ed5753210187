//! Record selection for clinicstore
//!
//! Filters and ordering shared by the remote adapters and the local
//! fail-over path.

pub mod filter;

pub use filter::{Direction, Filter, OrderBy, Query};
