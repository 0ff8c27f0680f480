use std::{
    collections::HashMap,
    hash::{BuildHasherDefault, Hash, Hasher},
};

/// Position, normal, and up to three optional channels.
pub const MAX_VERTEX_CHANNELS: usize = 5;

/// The attribute indices of one triangle corner. Corners with equal keys are welded.
#[derive(Clone, Copy, Debug)]
pub struct VertexKey {
    indices: [u32; MAX_VERTEX_CHANNELS],
    count: u8,
    hash: u32,
}

impl VertexKey {
    pub fn new(channel_indices: &[u32]) -> Self {
        assert!(
            channel_indices.len() <= MAX_VERTEX_CHANNELS,
            "a vertex has at most {} channels",
            MAX_VERTEX_CHANNELS
        );
        let mut indices = [0; MAX_VERTEX_CHANNELS];
        indices[..channel_indices.len()].copy_from_slice(channel_indices);

        let mut hasher = crc32fast::Hasher::new();
        for index in channel_indices {
            hasher.update(&index.to_le_bytes());
        }

        Self {
            indices,
            count: channel_indices.len() as u8,
            hash: hasher.finalize(),
        }
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices[..self.count as usize]
    }

    pub fn hash_value(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for VertexKey {
    fn eq(&self, other: &Self) -> bool {
        self.indices() == other.indices()
    }
}

impl Eq for VertexKey {}

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

/// Hands the precomputed CRC of a [`VertexKey`] to the map instead of hashing again.
#[derive(Default)]
pub struct PrecomputedHasher(u64);

impl Hasher for PrecomputedHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = (self.0 << 8 | u64::from(*byte)).wrapping_mul(0x100_0000_01b3);
        }
    }

    fn write_u32(&mut self, hash: u32) {
        // The map takes its control bits from the top of the hash.
        self.0 = u64::from(hash).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    }
}

pub type VertexKeyMap<V> = HashMap<VertexKey, V, BuildHasherDefault<PrecomputedHasher>>;
