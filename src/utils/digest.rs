use bincode::config;
use serde::Serialize;

use crate::error::Result;

/// cacluate [blake3] hash of a serilizeable object
pub fn digest<T: Serialize>(t: &T) -> Result<[u8; 32]> {
    let mut hasher = blake3::Hasher::new();
    let config = config::legacy();
    hasher.update(&bincode::serde::encode_to_vec(t, config)?);
    let mut hash = hasher.finalize_xof();
    let mut output = [0u8; 32];
    hash.fill(&mut output);
    Ok(output)
}

/// hash a volume password, only this hash is ever stored on disk
pub fn password_digest(password: impl AsRef<[u8]>) -> [u8; 32] {
    *blake3::hash(password.as_ref()).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let a = digest(&("a.txt", 3u64)).unwrap();
        let b = digest(&("a.txt", 3u64)).unwrap();
        let c = digest(&("a.txt", 4u64)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_password_digest() {
        assert_eq!(password_digest("cs2106"), password_digest(b"cs2106"));
        assert_ne!(password_digest("cs2106"), password_digest("2106s2"));
    }
}
