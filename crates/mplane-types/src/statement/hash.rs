// Content digests used for schema identity and default tokens

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest
pub const TOKEN_LENGTH: usize = 32;

pub(crate) fn digest(text: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(text.as_bytes()));
    hex.truncate(TOKEN_LENGTH);
    hex
}

pub(crate) fn sorted<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = names.collect();
    names.sort_unstable();
    names
}
