use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{EfsError, Result};

/// A structure that carries a digest of its own contents.
pub trait DigestInSelf {
    /// recompute the stored digest
    fn digest(&mut self) -> Result<()>;
    fn verify_digest(&mut self) -> Result<bool>;
}

/// bincode (legacy layout) encoding for [DigestInSelf] structures: the
/// digest is refreshed before every encode and checked after every decode
pub trait SerializeAndDigest: Serialize + DeserializeOwned + DigestInSelf {
    /// # Returns
    /// The number of bytes written
    fn serialize_into<W>(&mut self, w: &mut W) -> Result<usize>
    where
        W: Write,
    {
        self.digest()?;
        Ok(bincode::serde::encode_into_std_write(
            self,
            w,
            bincode::config::legacy(),
        )?)
    }

    fn serialize(&mut self) -> Result<Vec<u8>> {
        self.digest()?;
        Ok(bincode::serde::encode_to_vec(self, bincode::config::legacy())?)
    }

    fn deserialize_from<R>(r: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let object = bincode::serde::decode_from_std_read(r, bincode::config::legacy())?;
        verified(object)
    }

    /// # Returns
    /// The decoded object and the number of bytes it occupied
    fn deserialize(buf: &[u8]) -> Result<(Self, usize)> {
        let (object, bytes_read) =
            bincode::serde::decode_from_slice(buf, bincode::config::legacy())?;
        Ok((verified(object)?, bytes_read))
    }
}

fn verified<T: DigestInSelf>(mut object: T) -> Result<T> {
    if object.verify_digest()? {
        Ok(object)
    } else {
        Err(EfsError::Corrupted("digest verification failed".into()))
    }
}
