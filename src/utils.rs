//! Identifier minting helpers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id from a uuid7 then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// mint an id over one of the crate's fixed prefixes. the hrps are static and
// known-valid so encoding cannot fail.
fn mint_id(hrp: &'static str) -> String {
    let hrp = bech32::Hrp::parse_unchecked(hrp);
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .expect("bech32 encoding of a 16-byte uuid under a static hrp")
}

pub fn new_swap_id() -> String {
    mint_id("swap")
}

pub fn new_edge_id() -> String {
    mint_id("edge")
}

pub fn new_proposal_id() -> String {
    mint_id("prop")
}

pub fn new_request_id() -> String {
    mint_id("req")
}
