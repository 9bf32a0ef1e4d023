//! Decodes the CBOR footer the Solidity compiler appends to deployed
//! bytecode. The footer is a CBOR map followed by a 2-byte big-endian length
//! prefix for that map, at the very end of the bytecode.

use serde::{Deserialize, Serialize};

use crate::error::FooterError;
use crate::queue::MetadataPointer;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Footer {
    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    bzzr1: Option<Vec<u8>>,
    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    ipfs: Option<Vec<u8>>,
}

/// Scans `bytecode` for the trailing CBOR footer and decodes at most one
/// metadata pointer from it. `bzzr1` wins when both keys are present.
/// Any malformed or absent footer yields `Err`, and the caller silently
/// drops the contract rather than propagating the error further.
pub fn decode_footer(bytecode: &[u8]) -> Result<MetadataPointer, FooterError> {
    if bytecode.len() < 2 {
        return Err(FooterError::NoFooter);
    }
    let (body, len_bytes) = bytecode.split_at(bytecode.len() - 2);
    let cbor_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    if cbor_len == 0 || cbor_len > body.len() {
        return Err(FooterError::NoFooter);
    }
    let cbor_bytes = &body[body.len() - cbor_len..];

    let footer: Footer =
        cbor4ii::serde::from_slice(cbor_bytes).map_err(|_| FooterError::NotAMap)?;

    if let Some(hash) = footer.bzzr1 {
        return Ok(MetadataPointer::SwarmBzzr1 { hash: hex::encode(hash) });
    }
    if let Some(multihash) = footer.ipfs {
        return Ok(MetadataPointer::Ipfs {
            cid: bs58::encode(multihash).into_string(),
        });
    }
    Err(FooterError::NoRecognizedKey)
}

/// Appends a well-formed footer for `pointer` onto `bytecode`. Used by tests
/// and by fixtures that need to synthesize deployed bytecode.
pub fn encode_footer(bytecode: &[u8], pointer: &MetadataPointer) -> Vec<u8> {
    let footer = match pointer {
        MetadataPointer::SwarmBzzr1 { hash } => Footer {
            bzzr1: Some(hex::decode(hash).expect("valid hex hash")),
            ipfs: None,
        },
        MetadataPointer::Ipfs { cid } => Footer {
            bzzr1: None,
            ipfs: Some(bs58::decode(cid).into_vec().expect("valid base58 cid")),
        },
    };
    let cbor = cbor4ii::serde::to_vec(Vec::new(), &footer).expect("footer encodes");
    let mut out = Vec::with_capacity(bytecode.len() + cbor.len() + 2);
    out.extend_from_slice(bytecode);
    out.extend_from_slice(&cbor);
    out.extend_from_slice(&(cbor.len() as u16).to_be_bytes());
    out
}
