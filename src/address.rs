//! Deterministic `(sender, nonce) -> deployed address` derivation, per the
//! `keccak256(rlp([sender, nonce]))[12..]` rule shared by the EVM chains this
//! monitor tails.

/// Derives the address a contract-creation transaction from `sender` at
/// `nonce` deploys to.
pub fn derive_contract_address(sender: &[u8; 20], nonce: u64) -> [u8; 20] {
    let mut stream = rlp::RlpStream::new_list(2);
    stream.append(&sender.as_slice());
    stream.append(&nonce);
    let hash = keccak_hash::keccak(stream.out());

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash.0[12..]);
    address
}

/// Formats a raw 20-byte address as the lowercase `0x`-prefixed hex string
/// used as the queue key and repository path segment.
pub fn to_hex_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parses a `0x`-prefixed (or bare) 20-byte hex address, as returned by the
/// `from` field of a JSON-RPC transaction.
pub fn parse_address_hex(s: &str) -> Option<[u8; 20]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}
