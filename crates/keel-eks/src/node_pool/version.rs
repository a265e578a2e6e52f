//! Node pool version fingerprint
//!
//! The version is stored as a tag on the node pool's stack. Two launches
//! with the same fingerprint use the same immutable inputs, so an update that
//! does not change it has nothing to roll.

use std::fmt::Write;

use aws_lc_rs::digest;

/// Fingerprint of a node pool's immutable launch inputs
///
/// SHA-256 over the ordered concatenation of the image ID and the volume
/// size, hex encoded. `DefaultHasher` is not stable across Rust releases, and
/// this value is persisted as a tag, so a fixed digest is used instead.
pub fn node_pool_version(image: &str, volume_size: u32) -> String {
    let mut input = String::with_capacity(image.len() + 10);
    input.push_str(image);
    let _ = write!(input, "{volume_size}");

    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}
