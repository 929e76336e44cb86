//! Ownership trait for user-owned rows.
//!
//! Items, wishlist entries and profiles are only ever mutated by their
//! owner. Views check ownership locally before issuing a write so that the
//! user gets a precise message instead of a zero-row update.

use super::{DomainError, ErrorCode, UserId};

/// Trait for entities that have a single owner.
pub trait OwnedByUser {
    /// Returns the ID of the user who owns this resource.
    fn owner_id(&self) -> &UserId;

    /// Checks if the given user is the owner.
    fn is_owner(&self, user_id: &UserId) -> bool {
        self.owner_id() == user_id
    }

    /// Validates ownership, returning a `Forbidden` error if the user is not the owner.
    fn check_ownership(&self, user_id: &UserId) -> Result<(), DomainError> {
        if self.is_owner(user_id) {
            Ok(())
        } else {
            Err(
                DomainError::new(ErrorCode::Forbidden, "User does not own this resource")
                    .with_detail("owner_id", self.owner_id().to_string())
                    .with_detail("requested_by", user_id.to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listing {
        owner: UserId,
    }

    impl OwnedByUser for Listing {
        fn owner_id(&self) -> &UserId {
            &self.owner
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn check_ownership_succeeds_for_owner() {
        let listing = Listing { owner: user("owner-1") };
        assert!(listing.check_ownership(&user("owner-1")).is_ok());
    }

    #[test]
    fn check_ownership_fails_with_details_for_stranger() {
        let listing = Listing { owner: user("owner-1") };
        let err = listing.check_ownership(&user("other-2")).unwrap_err();

        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(err.details.get("owner_id"), Some(&"owner-1".to_string()));
        assert_eq!(err.details.get("requested_by"), Some(&"other-2".to_string()));
    }
}
