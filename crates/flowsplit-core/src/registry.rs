//! Recipient registry: lifecycle of the accounts and nested flows a flow
//! instance pays.
//!
//! Recipients are soft-deleted only. Historical vote records reference
//! recipient IDs, so a removed entry stays queryable forever; `removed` plus
//! the active count carry the lifecycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{hash, Address, FlowError, RecipientId, Result};

/// Kind of account behind a recipient entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecipientType {
    /// Plain external account receiving a share of the stream.
    ExternalAccount = 0,
    /// Nested flow instance that re-splits its share among its own recipients.
    FlowContract = 1,
}

impl RecipientType {
    pub fn from_u8(v: u8) -> Result<RecipientType> {
        match v {
            0 => Ok(RecipientType::ExternalAccount),
            1 => Ok(RecipientType::FlowContract),
            other => Err(FlowError::MalformedItem(format!(
                "unknown recipient type tag {other}"
            ))),
        }
    }
}

/// Display metadata for a recipient. Every field must be non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientMetadata {
    pub title: String,
    pub description: String,
    pub image: String,
}

impl RecipientMetadata {
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(FlowError::InvalidMetadata("title is empty".into()));
        }
        if self.description.is_empty() {
            return Err(FlowError::InvalidMetadata("description is empty".into()));
        }
        if self.image.is_empty() {
            return Err(FlowError::InvalidMetadata("image is empty".into()));
        }
        Ok(())
    }
}

/// One registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub address: Address,
    pub recipient_type: RecipientType,
    pub removed: bool,
    pub metadata: RecipientMetadata,
}

/// Registry of recipients for one flow instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecipientRegistry {
    recipients: BTreeMap<RecipientId, Recipient>,
    active_count: u32,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipient.
    ///
    /// Preconditions:
    /// - `address` is non-zero.
    /// - All metadata fields are non-empty.
    /// - No *active* recipient exists under the same content-addressed ID.
    ///   Re-adding a previously removed recipient reactivates the entry.
    ///
    /// Postconditions:
    /// - The returned ID is stable for `(address, metadata, recipient_type)`.
    /// - `active_count` increased by one.
    pub fn add(
        &mut self,
        address: Address,
        metadata: RecipientMetadata,
        recipient_type: RecipientType,
    ) -> Result<RecipientId> {
        if address.is_zero() {
            return Err(FlowError::AddressZero);
        }
        metadata.validate()?;

        let id = hash::recipient_id(address, &metadata, recipient_type);
        if let Some(existing) = self.recipients.get(&id) {
            if !existing.removed {
                return Err(FlowError::RecipientAlreadyExists { id });
            }
        }

        self.recipients.insert(
            id,
            Recipient {
                id,
                address,
                recipient_type,
                removed: false,
                metadata,
            },
        );
        self.active_count += 1;
        tracing::debug!(?id, ?address, "recipient added");
        Ok(id)
    }

    /// Soft-delete a recipient.
    ///
    /// Postconditions:
    /// - The entry remains queryable with `removed == true`.
    /// - `active_count` decreased by one.
    pub fn remove(&mut self, id: RecipientId) -> Result<&Recipient> {
        let recipient = self
            .recipients
            .get_mut(&id)
            .ok_or(FlowError::InvalidRecipientId { id })?;
        if recipient.removed {
            return Err(FlowError::RecipientAlreadyRemoved { id });
        }
        recipient.removed = true;
        self.active_count -= 1;
        tracing::debug!(?id, "recipient removed");
        Ok(recipient)
    }

    pub fn get(&self, id: RecipientId) -> Option<&Recipient> {
        self.recipients.get(&id)
    }

    /// Whether the recipient exists and has not been removed.
    pub fn is_active(&self, id: RecipientId) -> bool {
        self.recipients.get(&id).is_some_and(|r| !r.removed)
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    /// All entries, removed ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.values()
    }

    /// Active entries only.
    pub fn iter_active(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.values().filter(|r| !r.removed)
    }
}
