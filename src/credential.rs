//! Staff credentials
//!
//! Passwords are stored as bcrypt hashes in the `password` attribute of a
//! staff record.

use crate::config::StaffSeed;
use crate::error::Result;
use crate::storage::record::Record;

pub const USERNAME_FIELD: &str = "username";
pub const PASSWORD_FIELD: &str = "password";
pub const IS_ADMIN_FIELD: &str = "isAdmin";

/// Hash a password with the given bcrypt cost
pub fn hash(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a password against a stored hash.
///
/// A malformed hash counts as a mismatch.
pub fn verify(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// The default administrator record for a fresh staff collection
pub fn default_admin(seed: &StaffSeed) -> Result<Record> {
    let mut admin = Record::new(Record::generate_id());
    admin
        .set("name", "Administrator")
        .set(USERNAME_FIELD, seed.username.as_str())
        .set(PASSWORD_FIELD, hash(&seed.password, seed.credential_cost)?)
        .set("role", "admin")
        .set(IS_ADMIN_FIELD, true);
    Ok(admin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash("s3cret", 4).unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify("s3cret", &hashed));
        assert!(!verify("wrong", &hashed));
        assert!(!verify("s3cret", "not-a-hash"));
    }

    #[test]
    fn test_default_admin() {
        let seed = StaffSeed {
            username: "admin".into(),
            password: "admin".into(),
            credential_cost: 4,
        };
        let admin = default_admin(&seed).unwrap();

        assert_eq!(admin.get(IS_ADMIN_FIELD).and_then(|v| v.as_bool()), Some(true));
        let stored = admin.get(PASSWORD_FIELD).and_then(|v| v.as_str()).unwrap();
        assert!(verify("admin", stored));
    }
}
