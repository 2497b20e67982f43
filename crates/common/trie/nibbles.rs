/// A sequence of 4-bit trie path elements, one per byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Nibbles(Vec<u8>);

impl Nibbles {
    /// Create `Nibbles` from nibble values, each in `0..16`
    pub fn from_hex(hex: Vec<u8>) -> Self {
        debug_assert!(hex.iter().all(|nibble| *nibble < 16));
        Self(hex)
    }

    /// Splits bytes into nibbles, high half first
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(
            bytes
                .iter()
                .flat_map(|byte| [byte >> 4, byte & 0x0F])
                .collect(),
        )
    }

    /// Decodes a hex-prefix encoded path, as found in the first element of leaf and
    /// extension nodes. Returns the path and whether the flag marks it as a leaf path.
    ///
    /// prefix nibble | node type | path length
    /// --------------|-----------|------------
    /// 0             | extension | even
    /// 1             | extension | odd
    /// 2             | leaf      | even
    /// 3             | leaf      | odd
    pub fn decode_compact(compact: &[u8]) -> Option<(Self, bool)> {
        let (first, rest) = compact.split_first()?;
        let flag = first >> 4;
        if flag > 3 {
            return None;
        }
        let is_leaf = flag & 0x2 != 0;
        let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
        if flag & 0x1 != 0 {
            nibbles.push(first & 0x0F);
        }
        nibbles.extend(Self::from_bytes(rest).0);
        Some((Self(nibbles), is_leaf))
    }

    pub fn encode_compact(&self, is_leaf: bool) -> Vec<u8> {
        let mut hex = self.0.as_slice();
        let mut first = if is_leaf { 0x20 } else { 0x00 };
        if hex.len() % 2 == 1 {
            first += 0x10 + hex[0];
            hex = &hex[1..];
        }
        let mut compact = Vec::with_capacity(hex.len() / 2 + 1);
        compact.push(first);
        compact.extend(hex.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
        compact
    }

    /// Returns the amount of nibbles
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no nibbles
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns a new `Nibbles` made of `self` followed by `other`
    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        let mut nibbles = self.0.clone();
        nibbles.extend_from_slice(&other.0);
        Self(nibbles)
    }

    pub fn slice(&self, start: usize, end: usize) -> Nibbles {
        Self(self.0[start..end].to_vec())
    }
}
