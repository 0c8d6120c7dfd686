//! Image format detection from leading magic bytes.
//!
//! Claimed extensions and `Content-Type` headers are never consulted; the
//! bytes alone decide the format.

/// Image formats the proxy knows how to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

/// Signature table, checked in order. First match wins.
const SIGNATURES: &[(ImageFormat, &[u8])] = &[
    (ImageFormat::Jpeg, &[0xFF, 0xD8, 0xFF]),
    (ImageFormat::Png, &[0x89, 0x50, 0x4E, 0x47]),
    (ImageFormat::Gif, &[0x47, 0x49, 0x46, 0x38]),
    // "RIFF". The WEBP fourcc at offset 8 is not checked.
    (ImageFormat::Webp, &[0x52, 0x49, 0x46, 0x46]),
];

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Webp,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => ".jpg",
            ImageFormat::Png => ".png",
            ImageFormat::Gif => ".gif",
            ImageFormat::Webp => ".webp",
        }
    }

    pub fn signature(self) -> &'static [u8] {
        SIGNATURES
            .iter()
            .find(|(format, _)| *format == self)
            .map(|(_, magic)| *magic)
            .unwrap_or(&[])
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.mime_type().eq_ignore_ascii_case(mime.trim()))
    }
}

/// Classifies `bytes` by prefix. Buffers matching nothing (including empty
/// or truncated ones) are reported as JPEG.
pub fn detect(bytes: &[u8]) -> ImageFormat {
    SIGNATURES
        .iter()
        .find(|(_, magic)| bytes.starts_with(magic))
        .map(|(format, _)| *format)
        .unwrap_or(ImageFormat::Jpeg)
}

/// Extension for a MIME type string; unknown types map to `.jpg`.
pub fn extension_for(mime: &str) -> &'static str {
    ImageFormat::from_mime(mime)
        .map(ImageFormat::extension)
        .unwrap_or(".jpg")
}
