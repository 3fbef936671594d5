//! Local archive storage layout.
//!
//! Archives live under a root directory, grouped into bucket directories
//! named `<YYYYMMDD><letter>`, each holding files named `<cid>.car`.

mod allocator;
mod error;

pub use allocator::{Allocation, DEFAULT_DIR_SIZE_THRESHOLD, DirectoryAllocator};
pub use error::AllocateError;

/// File extension of stored archives.
pub const ARCHIVE_EXTENSION: &str = "car";

/// Returns the archive file name for a content identifier.
#[must_use]
pub fn archive_file_name(cid: &str) -> String {
    format!("{cid}.{ARCHIVE_EXTENSION}")
}
