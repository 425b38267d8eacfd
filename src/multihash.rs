// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Multihash code-table used for block integrity checks.
//!
//! The upstream `multihash` crate dropped the Identity hasher; identity CIDs
//! are common in archives, so it is backfilled here. See
//! <https://github.com/multiformats/rust-multihash/pull/289>.

pub mod prelude {
    pub use super::MultihashCode;
    pub use multihash_derive::MultihashDigest as _;
}

use crate::error::{Error, Result};
use cid::Cid;
use multihash_derive::{Hasher, MultihashDigest};

/// Multihash code of the identity "hash", whose digest is the payload itself.
pub const IDENTITY_CODE: u64 = 0x0;

/// Extends [`multihash_codetable::Code`] with `Identity`.
#[derive(Clone, Copy, Debug, Eq, MultihashDigest, PartialEq)]
#[mh(alloc_size = 64)]
pub enum MultihashCode {
    #[mh(code = 0x0, hasher = IdentityHasher::<64>)]
    Identity,
    /// SHA-256 (32-byte hash size)
    #[mh(code = 0x12, hasher = multihash_codetable::Sha2_256)]
    Sha2_256,
    /// SHA-512 (64-byte hash size)
    #[mh(code = 0x13, hasher = multihash_codetable::Sha2_512)]
    Sha2_512,
    /// SHA3-256 (32-byte hash size)
    #[mh(code = 0x16, hasher = multihash_codetable::Sha3_256)]
    Sha3_256,
    /// SHA3-512 (64-byte hash size)
    #[mh(code = 0x14, hasher = multihash_codetable::Sha3_512)]
    Sha3_512,
    /// BLAKE2b-256 (32-byte hash size)
    #[mh(code = 0xb220, hasher = multihash_codetable::Blake2b256)]
    Blake2b256,
    /// BLAKE2b-512 (64-byte hash size)
    #[mh(code = 0xb240, hasher = multihash_codetable::Blake2b512)]
    Blake2b512,
    /// BLAKE2s-256 (32-byte hash size)
    #[mh(code = 0xb260, hasher = multihash_codetable::Blake2s256)]
    Blake2s256,
    /// BLAKE3-256 (32-byte hash size)
    #[mh(code = 0x1e, hasher = multihash_codetable::Blake3_256)]
    Blake3_256,
}

/// True when the CID's multihash is the identity function.
pub fn is_identity(cid: &Cid) -> bool {
    cid.hash().code() == IDENTITY_CODE
}

/// Recomputes the multihash of `data` with the algorithm named by `cid`.
pub fn digest_for(cid: &Cid, data: &[u8]) -> Result<Multihash> {
    let code = MultihashCode::try_from(cid.hash().code())
        .map_err(|_| Error::UnsupportedMultihash(cid.hash().code()))?;
    Ok(code.digest(data))
}

/// Verifies that `data` hashes to the digest `cid` carries.
///
/// Identity CIDs are checked by direct comparison, since the digest is the
/// payload. On mismatch the error carries both the expected CID and the CID
/// the payload actually hashes to.
pub fn verify_block(cid: &Cid, data: &[u8]) -> Result<()> {
    if is_identity(cid) {
        if cid.hash().digest() == data {
            return Ok(());
        }
        let computed = digest_for(cid, data)?;
        return Err(Error::IntegrityMismatch {
            expected: *cid,
            computed: same_version_cid(cid, computed)?,
        });
    }
    let computed = digest_for(cid, data)?;
    if &computed == cid.hash() {
        return Ok(());
    }
    Err(Error::IntegrityMismatch {
        expected: *cid,
        computed: same_version_cid(cid, computed)?,
    })
}

/// Builds the CID `digest` would produce under the version and codec of
/// `like`, for mismatch reporting.
fn same_version_cid(like: &Cid, digest: Multihash) -> Result<Cid> {
    Ok(match like.version() {
        cid::Version::V0 => Cid::new_v0(digest)?,
        cid::Version::V1 => Cid::new_v1(like.codec(), digest),
    })
}

/// Calculate the [`Multihash`] of a byte stream without buffering it whole.
pub fn digest_byte_stream<R: std::io::Read>(
    code: MultihashCode,
    bytes: &mut R,
) -> Result<Multihash> {
    fn hash<'a, H: Hasher, R: std::io::Read>(
        hasher: &'a mut H,
        bytes: &'a mut R,
    ) -> Result<&'a [u8]> {
        let mut buf = [0; 1024];
        loop {
            let n = bytes.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if let Some(b) = buf.get(0..n) {
                hasher.update(b);
            }
        }
        Ok(hasher.finalize())
    }

    let wrap = |digest: &[u8]| {
        code.wrap(digest)
            .map_err(|_| Error::UnsupportedMultihash(u64::from(code)))
    };
    match code {
        MultihashCode::Sha2_256 => {
            let mut hasher = multihash_codetable::Sha2_256::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Sha2_512 => {
            let mut hasher = multihash_codetable::Sha2_512::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Sha3_256 => {
            let mut hasher = multihash_codetable::Sha3_256::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Sha3_512 => {
            let mut hasher = multihash_codetable::Sha3_512::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Blake2b256 => {
            let mut hasher = multihash_codetable::Blake2b256::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Blake2b512 => {
            let mut hasher = multihash_codetable::Blake2b512::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Blake2s256 => {
            let mut hasher = multihash_codetable::Blake2s256::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Blake3_256 => {
            let mut hasher = multihash_codetable::Blake3_256::default();
            wrap(hash(&mut hasher, bytes)?)
        }
        MultihashCode::Identity => {
            let mut hasher = IdentityHasher::<64>::default();
            wrap(hash(&mut hasher, bytes)?)
        }
    }
}

/// Identity hasher with a maximum size.
///
/// Input beyond the maximum size is silently dropped; callers validating
/// identity CIDs compare digests to payloads directly instead.
#[derive(Debug)]
pub struct IdentityHasher<const S: usize> {
    i: usize,
    bytes: [u8; S],
}

impl<const S: usize> Default for IdentityHasher<S> {
    fn default() -> Self {
        Self {
            i: 0,
            bytes: [0u8; S],
        }
    }
}

impl<const S: usize> multihash_derive::Hasher for IdentityHasher<S> {
    fn update(&mut self, input: &[u8]) {
        let start = self.i.min(self.bytes.len());
        let end = (self.i + input.len()).min(self.bytes.len());
        self.bytes[start..end].copy_from_slice(&input[..end - start]);
        self.i = end;
    }

    fn finalize(&mut self) -> &[u8] {
        &self.bytes[..self.i]
    }

    fn reset(&mut self) {
        self.i = 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::prelude::*;
    use rand::RngCore as _;
    use std::io::Cursor;

    #[test]
    fn digest_byte_stream_matches_digest() {
        use MultihashCode::*;

        for len in [0, 1, 100, 1024, 10000] {
            let mut bytes = vec![0; len];
            rand::thread_rng().fill_bytes(&mut bytes);
            let mut cursor = Cursor::new(bytes.clone());
            for code in [
                Sha2_256, Sha2_512, Sha3_256, Sha3_512, Blake2b256, Blake2b512, Blake2s256,
                Blake3_256,
            ] {
                cursor.set_position(0);
                let mh1 = code.digest(&bytes);
                let mh2 = digest_byte_stream(code, &mut cursor).unwrap();
                assert_eq!(mh1, mh2);
            }
        }
    }

    #[test]
    fn verify_accepts_matching_payload() {
        let data = b"hello blocks";
        let cid = Cid::new_v1(0x55, MultihashCode::Blake2b256.digest(data));
        verify_block(&cid, data).unwrap();
    }

    #[test]
    fn verify_rejects_altered_payload() {
        let data = b"hello blocks";
        let cid = Cid::new_v1(0x55, MultihashCode::Sha2_256.digest(data));
        let err = verify_block(&cid, b"hello block!").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::IntegrityMismatch { expected, .. } if expected == cid
        ));
    }

    #[test]
    fn identity_digest_is_payload() {
        let data = b"tiny";
        let mh = MultihashCode::Identity.digest(data);
        assert_eq!(mh.digest(), data);
        let cid = Cid::new_v1(0x55, mh);
        assert!(is_identity(&cid));
        verify_block(&cid, data).unwrap();
        assert!(verify_block(&cid, b"not tiny").is_err());
    }
}
