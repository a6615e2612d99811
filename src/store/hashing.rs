//! Content hashing
//!
//! SHA-256 over the exact bytes streamed into a storage, rendered as
//! lower-case hex.

use std::fmt::Write as _;
use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Lower-case hex, two digits per byte
pub fn to_hex_string(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// SHA-256 of `data` as hex
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex_string(&Sha256::digest(data))
}

/// Reader adapter digesting everything that passes through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Hex digest of the bytes read so far
    pub fn finalize_hex(self) -> String {
        to_hex_string(&self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
