//! Channel payload codec.
//!
//! What goes over a per-identity channel is an [`Envelope`]: the
//! cleartext addressing of a message wrapper plus the opaque encoded
//! body. CBOR keeps the payload self-describing, so a subscriber can
//! decode whatever a publisher on any node of the same deployment
//! wrote; encode and decode are exactly symmetric.

use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

/// One relayed message as published to a recipient channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub recipient: String,
    pub sender: String,
    /// Opaque end-to-end encrypted body; never inspected.
    pub encoded: Vec<u8>,
    /// Group conversation this message belongs to, when any.
    pub group_id: Option<String>,
}

impl Envelope {
    /// Encodes the envelope to CBOR bytes.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| StoreError::Codec {
            reason: e.to_string(),
        })?;
        Ok(buf)
    }

    /// Decodes an envelope from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Codec {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_is_symmetric() -> StoreResult<()> {
        let envelope = Envelope {
            recipient: "bob@example.com".into(),
            sender: "alice@example.com".into(),
            encoded: vec![0x01, 0x02, 0xFF],
            group_id: Some("g:reading-club-00aa11bb@example.com".into()),
        };

        let decoded = Envelope::from_bytes(&envelope.to_bytes()?)?;
        assert_eq!(decoded, envelope);
        Ok(())
    }

    #[test]
    fn group_reference_is_optional() -> StoreResult<()> {
        let envelope = Envelope {
            recipient: "bob@example.com".into(),
            sender: "alice@example.com".into(),
            encoded: b"ciphertext".to_vec(),
            group_id: None,
        };

        let decoded = Envelope::from_bytes(&envelope.to_bytes()?)?;
        assert_eq!(decoded.group_id, None);
        Ok(())
    }

    #[test]
    fn garbage_bytes_do_not_decode() {
        assert!(Envelope::from_bytes(b"definitely not cbor").is_err());
    }
}
