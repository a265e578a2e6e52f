//! Root volume size selection

use keel_common::{Error, Result};

/// Pick the root volume size for a node pool launch
///
/// An explicitly requested size must be able to hold the machine image. With
/// no explicit size, the current size (or `default_size` for a fresh launch)
/// is raised to the image size when the image is larger.
pub fn select_volume_size(
    node_pool: &str,
    requested: Option<u32>,
    current: Option<u32>,
    image_size: u32,
    default_size: u32,
) -> Result<u32> {
    match requested {
        Some(size) if size < image_size => Err(Error::validation_for_field(
            node_pool,
            "volumeSize",
            format!(
                "volume size {size} GiB is smaller than the {image_size} GiB required by the image"
            ),
        )),
        Some(size) => Ok(size),
        None => Ok(current.unwrap_or(default_size).max(image_size)),
    }
}
