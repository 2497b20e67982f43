use std::{collections::BTreeMap, fmt};

use ethkit_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use super::error::DevP2PError;

/// Codes 0x00..0x0f belong to the base protocol; capabilities are laid out after them.
pub const BASE_PROTOCOL_LENGTH: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability {
    pub name: String,
    pub version: u8,
}

impl Capability {
    pub fn new(name: &str, version: u8) -> Self {
        Self {
            name: name.to_owned(),
            version,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl RLPEncode for Capability {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.name)
            .encode_field(&self.version)
            .finish();
    }
}

impl RLPDecode for Capability {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (name, decoder) = decoder.decode_field("name")?;
        let (version, decoder) = decoder.decode_field("version")?;
        Ok((Capability { name, version }, decoder.finish_unchecked()))
    }
}

/// A capability we can speak, with the number of message codes it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedCapability {
    pub capability: Capability,
    /// Highest message code plus one.
    pub length: u8,
}

impl SupportedCapability {
    pub fn new(name: &str, version: u8, length: u8) -> Self {
        Self {
            capability: Capability::new(name, version),
            length,
        }
    }
}

/// A negotiated capability and the slice of the peer-global code space it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedCapability {
    pub capability: Capability,
    pub offset: u8,
    pub length: u8,
}

impl SharedCapability {
    fn contains(&self, code: u8) -> bool {
        code >= self.offset && code - self.offset < self.length
    }
}

/// Routing table between capability-local message codes and wire codes.
///
/// Both peers derive the same table independently: the shared set is sorted by name and
/// laid out from [`BASE_PROTOCOL_LENGTH`] upwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityTable {
    shared: Vec<SharedCapability>,
}

impl CapabilityTable {
    /// Intersects our capabilities with the remote's by exact `(name, version)`, keeping the
    /// highest shared version of each name.
    pub fn negotiate(
        local: &[SupportedCapability],
        remote: &[Capability],
    ) -> Result<Self, DevP2PError> {
        let mut highest: BTreeMap<&str, &SupportedCapability> = BTreeMap::new();
        for supported in local
            .iter()
            .filter(|supported| remote.contains(&supported.capability))
        {
            let entry = highest
                .entry(supported.capability.name.as_str())
                .or_insert(supported);
            if supported.capability.version > entry.capability.version {
                *entry = supported;
            }
        }
        if highest.is_empty() {
            return Err(DevP2PError::NoSharedCapabilities);
        }

        let mut offset = BASE_PROTOCOL_LENGTH;
        let mut shared = Vec::with_capacity(highest.len());
        for supported in highest.into_values() {
            shared.push(SharedCapability {
                capability: supported.capability.clone(),
                offset,
                length: supported.length,
            });
            offset = offset
                .checked_add(supported.length)
                .ok_or(DevP2PError::CodeSpaceExhausted)?;
        }
        Ok(Self { shared })
    }

    pub fn shared(&self) -> &[SharedCapability] {
        &self.shared
    }

    pub fn get(&self, name: &str) -> Option<&SharedCapability> {
        self.shared
            .iter()
            .find(|shared| shared.capability.name == name)
    }

    /// Wire code for a capability-local code, if the capability was negotiated.
    pub fn wire_code(&self, name: &str, code: u8) -> Option<u8> {
        self.get(name)
            .filter(|shared| code < shared.length)
            .map(|shared| shared.offset + code)
    }

    /// Capability owning a wire code, with the code translated back to its local value.
    pub fn route(&self, wire_code: u8) -> Option<(&SharedCapability, u8)> {
        self.shared
            .iter()
            .find(|shared| shared.contains(wire_code))
            .map(|shared| (shared, wire_code - shared.offset))
    }
}
