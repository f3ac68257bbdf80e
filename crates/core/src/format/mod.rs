//! Format identification.
//!
//! Formats are normalized to the closed [`Format`] enum. Detection prefers an
//! explicitly declared format, then the file name's extension, and falls back
//! to magic-byte sniffing. Containers whose extension does not say whether they
//! carry video (`mp4`, `mkv`, `webm`, `ogg`) are refined from their leading
//! bytes.

mod error;
mod sniff;
mod types;

pub use error::FormatError;
pub use sniff::{detect_format, refine_container, sniff, SNIFF_LEN};
pub use types::{Format, FormatFamily};
