// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::Result;
use crate::multihash;
use crate::v1;
use crate::varint_frame::frame_encoded_len;
use cid::Cid;
use std::io::Write;

/// One content-addressed block: a CID and the payload it addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl Block {
    /// Writes the block as one varint frame containing the CID and the
    /// data. Returns the bytes written.
    pub fn write_into(&self, writer: impl Write) -> std::io::Result<u64> {
        v1::write_section(writer, &self.cid, &self.data)
    }

    /// Length of the frame [`Self::write_into`] produces.
    pub fn encoded_len(&self) -> u64 {
        frame_encoded_len(self.cid.encoded_len() as u64 + self.data.len() as u64)
    }

    /// Parses a section body (CID followed by data) into a block.
    pub fn from_section_bytes(bytes: impl Into<Vec<u8>>) -> Result<Block> {
        let mut bytes: Vec<u8> = bytes.into();
        let (cid, cid_len) = v1::read_cid_prefix(&bytes)?;
        bytes.drain(..cid_len);
        Ok(Block { cid, data: bytes })
    }

    pub fn valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks that the payload hashes to the digest the CID carries.
    pub fn validate(&self) -> Result<()> {
        multihash::verify_block(&self.cid, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::prelude::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for Block {
        fn arbitrary(g: &mut Gen) -> Block {
            let data = Vec::<u8>::arbitrary(g);
            let code = g
                .choose(&[MultihashCode::Blake2b256, MultihashCode::Sha2_256])
                .unwrap();
            // raw (0x55) and dag-cbor (0x71) are the codecs archives carry most
            let codec = *g.choose(&[0x55u64, 0x71]).unwrap();
            let cid = Cid::new_v1(codec, code.digest(&data));
            Block { cid, data }
        }
    }

    #[quickcheck]
    fn wire_roundtrip(block: Block) {
        let mut bytes = vec![];
        let written = block.write_into(&mut bytes).unwrap();
        assert_eq!(written, block.encoded_len());

        let (cid, data) = crate::v1::read_section(std::io::Cursor::new(&bytes), false, 8 << 20)
            .unwrap()
            .unwrap();
        assert_eq!(Block { cid, data }, block);
    }

    #[quickcheck]
    fn arbitrary_blocks_validate(block: Block) {
        block.validate().unwrap();
    }

    #[test]
    fn altered_payload_fails_validation() {
        let data = b"payload".to_vec();
        let cid = Cid::new_v1(0x55, MultihashCode::Blake2b256.digest(&data));
        let block = Block {
            cid,
            data: b"payloae".to_vec(),
        };
        assert!(!block.valid());
    }
}
