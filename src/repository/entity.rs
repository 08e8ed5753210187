//! Entity definitions
//!
//! Each entity type maps to one collection (a local file and a remote
//! table of the same name) plus the per-type behaviour the repository
//! needs: whether records get a Sno, which fields remote search scans, and
//! which invariant guards deletes.

use crate::credential::IS_ADMIN_FIELD;
use crate::error::{Error, Result};
use crate::storage::record::Record;

/// Static description of an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpec {
    /// Collection / table name
    pub collection: &'static str,
    /// Assign a Sno on create
    pub sequenced: bool,
    /// Fields scanned by remote search
    pub search_fields: &'static [&'static str],
    /// Invariant checked against the local collection before a delete
    pub delete_guard: Option<DeleteGuard>,
}

pub const PATIENTS: EntitySpec = EntitySpec {
    collection: "patients",
    sequenced: false,
    search_fields: &["name", "phone", "email"],
    delete_guard: None,
};

pub const PRESCRIPTIONS: EntitySpec = EntitySpec {
    collection: "prescriptions",
    sequenced: true,
    search_fields: &["patientName", "doctor", "medicine"],
    delete_guard: None,
};

pub const OPERATIONS: EntitySpec = EntitySpec {
    collection: "operations",
    sequenced: false,
    search_fields: &["patientName", "surgeon", "procedure"],
    delete_guard: None,
};

pub const STAFF: EntitySpec = EntitySpec {
    collection: "staff",
    sequenced: false,
    search_fields: &["name", "username", "role"],
    delete_guard: Some(DeleteGuard::LastAdministrator),
};

pub const LABS: EntitySpec = EntitySpec {
    collection: "labs",
    sequenced: true,
    search_fields: &["patientName", "test"],
    delete_guard: None,
};

/// Every built-in entity type
pub const ALL: &[EntitySpec] = &[PATIENTS, PRESCRIPTIONS, OPERATIONS, STAFF, LABS];

/// Look up a built-in entity type by collection name
pub fn by_collection(name: &str) -> Option<EntitySpec> {
    ALL.iter().copied().find(|spec| spec.collection == name)
}

/// Business rules enforced before a delete reaches either store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
    /// At least one record with `isAdmin = true` must remain
    LastAdministrator,
}

impl DeleteGuard {
    /// Check the rule for deleting `target` from `collection`
    pub fn check(&self, collection_name: &str, target: &Record, collection: &[Record]) -> Result<()> {
        match self {
            DeleteGuard::LastAdministrator => {
                if !is_admin(target) {
                    return Ok(());
                }
                let admins = collection.iter().filter(|r| is_admin(r)).count();
                if admins <= 1 {
                    return Err(Error::InvariantViolation {
                        collection: collection_name.to_string(),
                        message: "cannot delete the last administrator".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

fn is_admin(record: &Record) -> bool {
    record
        .get(IS_ADMIN_FIELD)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff(id: &str, admin: bool) -> Record {
        let mut record = Record::new(id);
        record.set(IS_ADMIN_FIELD, admin);
        record
    }

    #[test]
    fn test_last_admin_protected() {
        let all = vec![staff("a", true), staff("b", false)];
        let guard = DeleteGuard::LastAdministrator;

        assert!(matches!(
            guard.check("staff", &all[0], &all),
            Err(Error::InvariantViolation { .. })
        ));
        assert!(guard.check("staff", &all[1], &all).is_ok());
    }

    #[test]
    fn test_one_of_two_admins_may_go() {
        let all = vec![staff("a", true), staff("b", true)];
        assert!(DeleteGuard::LastAdministrator
            .check("staff", &all[0], &all)
            .is_ok());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(by_collection("labs"), Some(LABS));
        assert!(by_collection("receipts").is_none());
        assert!(PRESCRIPTIONS.sequenced && LABS.sequenced);
        assert!(!PATIENTS.sequenced);
    }
}
