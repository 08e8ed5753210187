//! Session context
//!
//! Identifies who is performing a write. Passed explicitly to repository
//! calls that stamp `createdBy` / `updatedBy`.

use serde::{Deserialize, Serialize};

/// The acting user of a repository call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    actor: String,
}

impl Session {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    /// Session for writes made by the engine itself (seeding, CLI without login)
    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}
