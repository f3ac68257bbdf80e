//! Content sniffing.

use std::path::Path;

use super::error::FormatError;
use super::types::Format;

/// Number of leading bytes worth handing to [`detect_format`].
pub const SNIFF_LEN: usize = 64 * 1024;

/// Matroska codec ids that denote a video track.
const MATROSKA_VIDEO_CODECS: &[&[u8]] = &[
    b"V_VP8",
    b"V_VP9",
    b"V_AV1",
    b"V_MPEG4",
    b"V_MPEGH",
    b"V_MPEG1",
    b"V_MPEG2",
    b"V_THEORA",
    b"V_MS/VFW",
    b"V_REAL",
    b"V_UNCOMPRESSED",
];

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Identifies a format from its leading bytes alone.
///
/// Returns `None` for plain text that could be either Markdown or TXT.
pub fn sniff(head: &[u8]) -> Option<Format> {
    if head.starts_with(b"%PDF-") {
        return Some(Format::Pdf);
    }
    if head.starts_with(b"{\\rtf") {
        return Some(Format::Rtf);
    }
    if head.starts_with(b"fLaC") {
        return Some(Format::Flac);
    }
    if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0)
    {
        return Some(Format::Mp3);
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        return match &head[8..12] {
            b"WAVE" => Some(Format::Wav),
            b"AVI " => Some(Format::Avi),
            b"WEBP" => Some(Format::Webp),
            _ => None,
        };
    }
    if head.starts_with(b"OggS") {
        return Some(refine_container(Format::Ogg, head));
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        let format = match &head[8..12] {
            b"qt  " => Format::Mov,
            _ => Format::Mp4,
        };
        return Some(refine_container(format, head));
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let window = &head[..head.len().min(64)];
        let format = if contains(window, b"webm") {
            Format::Webm
        } else {
            Format::Mkv
        };
        return Some(refine_container(format, head));
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Format::Jpeg);
    }
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(Format::Png);
    }
    if head.len() >= 14 && head.starts_with(b"BM") {
        return Some(Format::Bmp);
    }
    if head.starts_with(b"PK\x03\x04") {
        if contains(head, b"mimetypeapplication/vnd.oasis.opendocument.text") {
            return Some(Format::Odt);
        }
        if contains(head, b"word/") {
            return Some(Format::Docx);
        }
        return None;
    }

    let text = String::from_utf8_lossy(&head[..head.len().min(512)]);
    let trimmed = text.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
        return Some(Format::Html);
    }
    if trimmed.starts_with("\\documentclass") {
        return Some(Format::Latex);
    }
    None
}

/// Refines an ambiguous container format using its content.
///
/// Non-container formats, or content that says nothing either way, are
/// returned unchanged.
pub fn refine_container(format: Format, head: &[u8]) -> Format {
    match format {
        Format::Mp4 => {
            let brand_is_audio = head.len() >= 12
                && &head[4..8] == b"ftyp"
                && matches!(&head[8..12], b"M4A " | b"M4B ");
            let audio_only_moov = contains(head, b"moov")
                && contains(head, b"soun")
                && !contains(head, b"vide");
            if brand_is_audio || audio_only_moov {
                Format::M4a
            } else {
                format
            }
        }
        Format::Mkv | Format::Webm => {
            let has_video = MATROSKA_VIDEO_CODECS.iter().any(|c| contains(head, c));
            if !has_video && contains(head, b"A_") {
                Format::Mka
            } else {
                format
            }
        }
        Format::Ogg => {
            if contains(head, b"\x80theora") {
                Format::Ogv
            } else {
                format
            }
        }
        other => other,
    }
}

/// Determines the format of an incoming file.
///
/// `declared` is a format named by the caller, `file_name` the original name
/// of the attachment and `head` its leading bytes (see [`SNIFF_LEN`]).
pub fn detect_format(
    declared: Option<&str>,
    file_name: Option<&str>,
    head: &[u8],
) -> Result<Format, FormatError> {
    let from_name = match declared {
        Some(name) => Some(name.parse::<Format>()?),
        None => file_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .and_then(Format::from_extension),
    };

    match from_name {
        Some(format) if format.is_ambiguous_container() => Ok(refine_container(format, head)),
        Some(format) => Ok(format),
        None => sniff(head).ok_or(FormatError::Unrecognized),
    }
}
