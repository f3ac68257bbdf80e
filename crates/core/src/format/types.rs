//! Format identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::FormatError;

/// Broad family a format belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Audio,
    Video,
    Image,
    Document,
}

impl FormatFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// A normalized file format.
///
/// Serialized as its canonical extension (`"mp3"`, `"md"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    // Audio
    Mp3,
    Ogg,
    Wav,
    Flac,
    /// MPEG-4 container holding audio only.
    M4a,
    /// Matroska/WebM container holding audio only.
    Mka,
    // Video
    Mp4,
    Mkv,
    Webm,
    Avi,
    Mov,
    /// Ogg container with a Theora video stream.
    Ogv,
    // Image
    Jpeg,
    Png,
    Webp,
    Bmp,
    // Documents
    Markdown,
    Html,
    Txt,
    Docx,
    Odt,
    Rtf,
    Latex,
    Pdf,
}

impl Format {
    /// Every known format, in declaration order.
    pub const ALL: [Format; 24] = [
        Format::Mp3,
        Format::Ogg,
        Format::Wav,
        Format::Flac,
        Format::M4a,
        Format::Mka,
        Format::Mp4,
        Format::Mkv,
        Format::Webm,
        Format::Avi,
        Format::Mov,
        Format::Ogv,
        Format::Jpeg,
        Format::Png,
        Format::Webp,
        Format::Bmp,
        Format::Markdown,
        Format::Html,
        Format::Txt,
        Format::Docx,
        Format::Odt,
        Format::Rtf,
        Format::Latex,
        Format::Pdf,
    ];

    /// Canonical file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Mka => "mka",
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Ogv => "ogv",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Txt => "txt",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Latex => "tex",
            Self::Pdf => "pdf",
        }
    }

    /// Human readable name shown to users picking a target.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Ogg => "OGG",
            Self::Wav => "WAV",
            Self::Flac => "FLAC",
            Self::M4a => "M4A",
            Self::Mka => "MKA",
            Self::Mp4 => "MP4",
            Self::Mkv => "MKV",
            Self::Webm => "WebM",
            Self::Avi => "AVI",
            Self::Mov => "MOV",
            Self::Ogv => "OGV",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Webp => "WebP",
            Self::Bmp => "BMP",
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
            Self::Txt => "TXT",
            Self::Docx => "DOCX",
            Self::Odt => "ODT",
            Self::Rtf => "RTF",
            Self::Latex => "LaTeX",
            Self::Pdf => "PDF",
        }
    }

    /// MIME type used when delivering a file of this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::M4a => "audio/mp4",
            Self::Mka => "audio/x-matroska",
            Self::Mp4 => "video/mp4",
            Self::Mkv => "video/x-matroska",
            Self::Webm => "video/webm",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
            Self::Ogv => "video/ogg",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Txt => "text/plain",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Rtf => "application/rtf",
            Self::Latex => "application/x-latex",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            Self::Mp3 | Self::Ogg | Self::Wav | Self::Flac | Self::M4a | Self::Mka => {
                FormatFamily::Audio
            }
            Self::Mp4 | Self::Mkv | Self::Webm | Self::Avi | Self::Mov | Self::Ogv => {
                FormatFamily::Video
            }
            Self::Jpeg | Self::Png | Self::Webp | Self::Bmp => FormatFamily::Image,
            Self::Markdown
            | Self::Html
            | Self::Txt
            | Self::Docx
            | Self::Odt
            | Self::Rtf
            | Self::Latex
            | Self::Pdf => FormatFamily::Document,
        }
    }

    /// Whether the extension alone cannot tell audio-only from video content.
    pub fn is_ambiguous_container(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mkv | Self::Webm | Self::Ogg)
    }

    /// Parses an extension or format name.
    ///
    /// Case-insensitive, tolerates a leading dot and common aliases.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match normalized.as_str() {
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "wav" | "wave" => Self::Wav,
            "flac" => Self::Flac,
            "m4a" => Self::M4a,
            "mka" => Self::Mka,
            "mp4" | "m4v" => Self::Mp4,
            "mkv" => Self::Mkv,
            "webm" => Self::Webm,
            "avi" => Self::Avi,
            "mov" => Self::Mov,
            "ogv" => Self::Ogv,
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "bmp" => Self::Bmp,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "txt" | "text" => Self::Txt,
            "docx" => Self::Docx,
            "odt" => Self::Odt,
            "rtf" => Self::Rtf,
            "tex" | "latex" => Self::Latex,
            "pdf" => Self::Pdf,
            _ => return None,
        };
        Some(format)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| FormatError::Unknown {
            name: s.to_string(),
        })
    }
}

impl TryFrom<String> for Format {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.extension().to_string()
    }
}
