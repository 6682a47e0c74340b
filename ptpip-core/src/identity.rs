//! Client identity presented in the init command request

use crate::{
    constants::{FRIENDLY_NAME_MAX_CHARS, GUID_LENGTH},
    packet::Packet,
};

/// GUID and friendly name this client introduces itself with
///
/// Devices that remember paired clients key them on the GUID, so it should be
/// stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    guid: [u8; GUID_LENGTH],
    name: String,
}

impl ClientIdentity {
    /// Identity with a GUID derived from a device identifier string
    ///
    /// # Examples
    ///
    /// ```
    /// use ptpip_core::ClientIdentity;
    ///
    /// let identity = ClientIdentity::new("uuid:8810B996-6884-1894", "studio");
    /// assert_eq!(identity.guid(), b"8810B99668841894");
    /// ```
    pub fn new(identifier: &str, name: &str) -> Self {
        Self {
            guid: derive_guid(identifier),
            name: name.chars().take(FRIENDLY_NAME_MAX_CHARS).collect(),
        }
    }

    /// Use the given bytes as the GUID
    pub fn with_guid(mut self, guid: [u8; GUID_LENGTH]) -> Self {
        self.guid = guid;
        self
    }

    pub fn guid(&self) -> &[u8; GUID_LENGTH] {
        &self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The init command request for this identity
    pub fn init_request(&self) -> Packet {
        Packet::InitCommandRequest {
            guid: self.guid,
            name: self.name.clone(),
        }
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::new("ptpip-rs-client-0001", "ptpip")
    }
}

/// Drop any "uuid" marker and punctuation, keep the last 16 characters and
/// zero-pad to the GUID length.
fn derive_guid(identifier: &str) -> [u8; GUID_LENGTH] {
    let cleaned: Vec<u8> = identifier
        .replace("uuid", "")
        .bytes()
        .filter(u8::is_ascii_alphanumeric)
        .collect();
    let tail = &cleaned[cleaned.len().saturating_sub(GUID_LENGTH)..];

    let mut guid = [0u8; GUID_LENGTH];
    guid[..tail.len()].copy_from_slice(tail);
    guid
}
