//! Upload validation and the display-only preview.
//!
//! An [`ImageAsset`] wraps the uploaded buffer as-is. Nothing in this module
//! rewrites those bytes; the preview in [`DisplayImage`] is decoded from a
//! shared, immutable handle and encoded into a fresh buffer.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageOutputFormat;

use crate::error::Failure;

/// The image encodings the captioner accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Accepts a bare extension (`png`, `.JPG`) or a whole file name.
    pub fn from_extension(declared: &str) -> Option<Self> {
        let ext = declared
            .trim()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    fn decoder_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }

    fn output_format(self) -> ImageOutputFormat {
        match self {
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(85),
            ImageFormat::Png => ImageOutputFormat::Png,
        }
    }
}

/// A validated upload, ready to be sent to the captioning service.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    bytes: Bytes,
    format: ImageFormat,
}

impl ImageAsset {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    max_bytes: usize,
}

impl ImageValidator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validates `bytes` against the format named by `declared_extension`.
    pub fn validate(
        &self,
        bytes: impl Into<Bytes>,
        declared_extension: &str,
    ) -> Result<ImageAsset, Failure> {
        let declared = ImageFormat::from_extension(declared_extension).ok_or_else(|| {
            Failure::InvalidFormat(format!(
                "unsupported file type {declared_extension:?}; upload a JPG, JPEG or PNG image"
            ))
        })?;
        self.check(bytes.into(), declared)
    }

    /// Validates a multipart upload. The file name decides the declared format;
    /// the part's content type is only consulted when the name carries no
    /// usable extension.
    pub fn validate_upload(
        &self,
        bytes: impl Into<Bytes>,
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<ImageAsset, Failure> {
        let declared = file_name
            .and_then(ImageFormat::from_extension)
            .or_else(|| content_type.and_then(ImageFormat::from_mime));

        match (declared, file_name) {
            (Some(format), _) => self.check(bytes.into(), format),
            (None, Some(name)) => self.validate(bytes, name),
            (None, None) => Err(Failure::InvalidFormat(
                "upload has neither a file name nor an image content type".to_string(),
            )),
        }
    }

    fn check(&self, bytes: Bytes, declared: ImageFormat) -> Result<ImageAsset, Failure> {
        if bytes.is_empty() {
            return Err(Failure::InvalidFormat("uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(Failure::InvalidFormat(format!(
                "file is {} bytes, the limit is {} bytes",
                bytes.len(),
                self.max_bytes
            )));
        }

        match image::guess_format(&bytes) {
            Ok(sniffed) if sniffed == declared.decoder_format() => {}
            Ok(sniffed) => {
                return Err(Failure::InvalidFormat(format!(
                    "file is declared as {} but its contents look like {:?}",
                    declared.mime_type(),
                    sniffed
                )));
            }
            Err(_) => {
                return Err(Failure::InvalidFormat(format!(
                    "file contents are not a recognisable {} image",
                    declared.mime_type()
                )));
            }
        }

        tracing::debug!(
            format = declared.mime_type(),
            size = bytes.len(),
            "Upload validated"
        );

        Ok(ImageAsset {
            bytes,
            format: declared,
        })
    }
}

/// A scaled copy of an upload for on-screen display only.
#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl DisplayImage {
    /// Decodes `asset` and scales it down to `max_width`, keeping the aspect
    /// ratio. Images already narrower than `max_width` keep their size.
    pub fn from_asset(asset: &ImageAsset, max_width: u32) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory_with_format(asset.bytes(), asset.format.decoder_format())?;

        let img = if max_width > 0 && img.width() > max_width {
            let height = (u64::from(img.height()) * u64::from(max_width) / u64::from(img.width()))
                .max(1) as u32;
            img.resize_exact(max_width, height, FilterType::Triangle)
        } else {
            img
        };

        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), asset.format.output_format())?;

        Ok(Self {
            bytes,
            format: asset.format,
            width: img.width(),
            height: img.height(),
        })
    }

    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}
