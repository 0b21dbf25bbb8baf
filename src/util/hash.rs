use sha2::{Digest, Sha256};

const HASH_BLOCK_U64_COUNT: usize = 4;

pub type HashBlock = [u64; HASH_BLOCK_U64_COUNT];

pub const HASH_ZERO_BLOCK: HashBlock = [0; HASH_BLOCK_U64_COUNT];

/// SHA-256 of the little-endian words, read back as four little-endian words.
pub fn hash(input: &[u64]) -> HashBlock {
    let mut hasher = Sha256::new();
    for word in input {
        hasher.update(word.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut destination = HASH_ZERO_BLOCK;
    for (word, bytes) in destination.iter_mut().zip(digest.chunks_exact(8)) {
        let mut buffer = [0u8; 8];
        buffer.copy_from_slice(bytes);
        *word = u64::from_le_bytes(buffer);
    }
    destination
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash() {
        let data = [1u64, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(
            hash(&data),
            [0xc91516ef25e48a80, 0x800f0651aad1f12c, 0x52396646e3748df1, 0xfa6485cfcd94ff4e],
        );
        assert_ne!(hash(&data[..7]), hash(&data));
    }
}
