//! Canonical encoding of curation-registry items.
//!
//! A registry item is the `(address, metadata, recipient_type)` tuple a
//! curator submits for listing. Its hash is the recipient ID itself, so a
//! re-submission of the same tuple is detected idempotently by the registry.

use serde::{Deserialize, Serialize};

use crate::registry::{RecipientMetadata, RecipientType};
use crate::{hash, Address, FlowError, RecipientId, Result};

/// Encoding version tag, first byte of every encoded item.
const ITEM_ENCODING_V1: u8 = 1;

/// A recipient submission as carried by the curation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryItem {
    pub address: Address,
    pub metadata: RecipientMetadata,
    pub recipient_type: RecipientType,
}

impl RegistryItem {
    /// Content-addressed item hash; equals the recipient ID the registry
    /// assigns on admission.
    pub fn item_hash(&self) -> RecipientId {
        hash::recipient_id(self.address, &self.metadata, self.recipient_type)
    }

    /// Canonical byte encoding: `version(1) || address(20) || title ||
    /// description || image || type(1)`, strings length-prefixed (u32 LE).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            2 + 20
                + 12
                + self.metadata.title.len()
                + self.metadata.description.len()
                + self.metadata.image.len(),
        );
        buf.push(ITEM_ENCODING_V1);
        buf.extend_from_slice(&self.address.0);
        for s in [
            &self.metadata.title,
            &self.metadata.description,
            &self.metadata.image,
        ] {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf.push(self.recipient_type as u8);
        buf
    }

    /// Decode a canonical encoding, rejecting malformed input.
    pub fn decode(bytes: &[u8]) -> Result<RegistryItem> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let version = cursor.take_u8()?;
        if version != ITEM_ENCODING_V1 {
            return Err(FlowError::MalformedItem(format!(
                "unsupported encoding version {version}"
            )));
        }

        let mut address = [0u8; 20];
        address.copy_from_slice(cursor.take(20)?);

        let title = cursor.take_string()?;
        let description = cursor.take_string()?;
        let image = cursor.take_string()?;
        let recipient_type = RecipientType::from_u8(cursor.take_u8()?)?;

        if cursor.pos != bytes.len() {
            return Err(FlowError::MalformedItem("trailing bytes".into()));
        }

        Ok(RegistryItem {
            address: Address(address),
            metadata: RecipientMetadata {
                title,
                description,
                image,
            },
            recipient_type,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| FlowError::MalformedItem("truncated item".into()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_string(&mut self) -> Result<String> {
        let len_bytes = self.take(4)?;
        let len = u32::from_le_bytes(len_bytes.try_into().expect("4 bytes")) as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| FlowError::MalformedItem("non-utf8 string field".into()))
    }
}
