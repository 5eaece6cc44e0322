//! Id minting and request numbering

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique addressable id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Render a store-issued sequence number as the human-readable request
/// number, e.g. `LR-000042`.
pub fn format_request_number(prefix: &str, sequence: u64) -> String {
    format!("{}-{:06}", prefix, sequence)
}
