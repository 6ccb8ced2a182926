// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership checks for registry rows.
//!
//! Owner-facing handlers load a row and pass it through
//! [`OwnershipCheck::verify_owner`] before acting on it.

use crate::auth::AuthenticatedUser;

use super::registry::{RegistryError, RegistryResult};

/// Rows that belong to an account.
pub trait OwnedResource {
    fn owner_user_id(&self) -> &str;

    /// Name used in permission errors.
    fn resource_name(&self) -> String {
        "address".to_string()
    }
}

pub trait OwnershipEnforcer {
    /// # Errors
    /// Returns `RegistryError::PermissionDenied` if the user doesn't own the row.
    fn verify_ownership(&self, user: &AuthenticatedUser) -> RegistryResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, user: &AuthenticatedUser) -> RegistryResult<()> {
        if self.owner_user_id() == user.user_id {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied {
                user_id: user.user_id.clone(),
                resource: self.resource_name(),
            })
        }
    }
}

/// Verify ownership on a lookup result and hand back the row.
pub trait OwnershipCheck<T> {
    fn verify_owner(self, user: &AuthenticatedUser) -> RegistryResult<T>;
}

impl<T: OwnedResource> OwnershipCheck<T> for RegistryResult<Option<T>> {
    fn verify_owner(self, user: &AuthenticatedUser) -> RegistryResult<T> {
        match self? {
            Some(resource) => {
                resource.verify_ownership(user)?;
                Ok(resource)
            }
            None => Err(RegistryError::NotFound("address".to_string())),
        }
    }
}
