//! Photo encoding: raw bytes to `data:` URLs, and content addressing of encoded photos.
//!
//! Photos are kept in their final, self-describing form (`data:<mime>;base64,<payload>`)
//! so a post can carry them without any side storage. Visually identical uploads are
//! stored once, keyed by a hash of the encoded form.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::ImageReader;
use std::{fmt::Display, hash::Hasher, io::Cursor, path::PathBuf, str::FromStr};
use twox_hash::XxHash64;

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// An image in its final, encoded form: a base64 `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Encodes raw image bytes into a `data:` URL.
    ///
    /// The MIME type is sniffed from the content, not trusted from a file name. The
    /// image header is decoded to make sure the bytes are an image the `image` crate
    /// understands; pixel data is not decoded.
    ///
    /// # Errors
    /// - `DecodeError::UnsupportedFile` if the content is not a recognisable image.
    /// - `DecodeError::Image` if the header cannot be read.
    ///
    /// # Examples
    ///
    /// ```
    /// # use archlog::photo::{DecodeError, EncodedImage};
    /// let result = EncodedImage::encode(b"plain text, not a photo");
    /// assert!(matches!(result, Err(DecodeError::UnsupportedFile { .. })));
    /// ```
    pub fn encode(bytes: &[u8]) -> Result<EncodedImage, DecodeError> {
        let kind = infer::get(bytes).ok_or(DecodeError::UnsupportedFile { kind: None })?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(DecodeError::UnsupportedFile { kind: Some(kind) });
        }

        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?
            .into_dimensions()?;

        tracing::trace!(mime = kind.mime_type(), width, height, "encoding photo");

        Ok(EncodedImage(format!(
            "{}{}{}{}",
            DATA_URL_PREFIX,
            kind.mime_type(),
            BASE64_MARKER,
            STANDARD.encode(bytes)
        )))
    }

    /// Accepts an already-encoded `data:image/...;base64,...` URL.
    ///
    /// The payload is decoded and checked like freshly read bytes, and the URL is
    /// rebuilt from them, so the declared MIME type always matches the content.
    ///
    /// # Errors
    /// - `DecodeError::MalformedDataUrl` if the envelope or the base64 payload is broken.
    /// - `DecodeError::UnsupportedFile` or `DecodeError::Image` as for [`EncodedImage::encode`].
    pub fn parse(data_url: &str) -> Result<EncodedImage, DecodeError> {
        let rest = data_url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or(DecodeError::MalformedDataUrl)?;
        let (mime, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or(DecodeError::MalformedDataUrl)?;

        if !mime.starts_with("image/") || payload.is_empty() {
            return Err(DecodeError::MalformedDataUrl);
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| DecodeError::MalformedDataUrl)?;

        EncodedImage::encode(&bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The MIME type declared by the URL, if it has the expected shape.
    pub fn mime_type(&self) -> Option<&str> {
        self.0
            .strip_prefix(DATA_URL_PREFIX)?
            .split_once(BASE64_MARKER)
            .map(|(mime, _)| mime)
    }

    /// Decodes the payload back into the original bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        let (_, payload) = self
            .0
            .split_once(BASE64_MARKER)
            .ok_or(DecodeError::MalformedDataUrl)?;

        STANDARD
            .decode(payload)
            .map_err(|_| DecodeError::MalformedDataUrl)
    }

    /// Content address of this photo.
    pub fn hash(&self) -> PhotoHash {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(self.0.as_bytes());

        PhotoHash::from(hasher.finish())
    }
}

/// Wraps a string that is already known to be a data URL, e.g. one read back from the store.
impl From<String> for EncodedImage {
    fn from(value: String) -> Self {
        EncodedImage(value)
    }
}

impl Display for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EncodedImage {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncodedImage::parse(s)
    }
}

/// Why a single photo could not be turned into an [`EncodedImage`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file format: {}", kind.as_ref().map(|k| k.mime_type()).unwrap_or("unknown"))]
    UnsupportedFile { kind: Option<infer::Type> },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("malformed data url")]
    MalformedDataUrl,
}

/// An 8-byte XxHash64 digest identifying an encoded photo.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhotoHash([u8; 8]);

impl Display for PhotoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for PhotoHash {
    type Error = PhotoHashParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() != 16 {
            return Err(PhotoHashParseError::InvalidLength);
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PhotoHashParseError::InvalidHex);
        }

        let mut bytes = [0u8; 8];

        for (i, byte) in bytes.iter_mut().enumerate() {
            let chunk = &value[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(chunk, 16).map_err(|_| PhotoHashParseError::InvalidHex)?;
        }

        Ok(PhotoHash(bytes))
    }
}

impl TryFrom<String> for PhotoHash {
    type Error = PhotoHashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<u64> for PhotoHash {
    fn from(value: u64) -> Self {
        PhotoHash(value.to_be_bytes())
    }
}

impl From<PhotoHash> for u64 {
    fn from(value: PhotoHash) -> Self {
        u64::from_be_bytes(value.0)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PhotoHashParseError {
    #[error("photo hash must be exactly 16 hexadecimal characters")]
    InvalidLength,
    #[error("photo hash contains invalid hexadecimal characters")]
    InvalidHex,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{DecodeError, EncodedImage, PhotoHash, PhotoHashParseError};
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    /// A tiny PNG generated on the fly.
    pub(crate) fn png_bytes() -> Vec<u8> {
        png_sized(2, 3)
    }

    /// A PNG of the given size; different sizes give different photos.
    pub(crate) fn png_sized(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 180, 160, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// `png_sized` as a pasted `data:` URL.
    pub(crate) fn png_data_url(width: u32, height: u32) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(png_sized(width, height)))
    }

    #[test]
    fn test_encode_png() {
        let bytes = png_bytes();
        let encoded = EncodedImage::encode(&bytes).unwrap();

        assert!(encoded.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(Some("image/png"), encoded.mime_type());
        assert_eq!(bytes, encoded.to_bytes().unwrap());
    }

    #[test]
    fn test_encode_rejects_non_image() {
        let result = EncodedImage::encode(b"just some text");
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedFile { kind: None })
        ));

        // A PDF is recognised, but it is not an image.
        let result = EncodedImage::encode(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n");
        let Err(DecodeError::UnsupportedFile { kind: Some(kind) }) = result else {
            panic!("Expected UnsupportedFile with a kind, but got {:?}", result);
        };
        assert_eq!("application/pdf", kind.mime_type());
    }

    #[test]
    fn test_encode_rejects_truncated_png() {
        let bytes = png_bytes();
        let result = EncodedImage::encode(&bytes[..12]);

        assert!(matches!(result, Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_parse_data_url() {
        let pasted = EncodedImage::parse(&png_data_url(4, 4)).unwrap();
        assert_eq!(Some("image/png"), pasted.mime_type());
        assert_eq!(png_sized(4, 4), pasted.to_bytes().unwrap());
        assert_eq!(EncodedImage::encode(&png_sized(4, 4)).unwrap(), pasted);

        assert!(matches!(
            EncodedImage::parse("https://example.com/a.png"),
            Err(DecodeError::MalformedDataUrl)
        ));
        assert!(matches!(
            EncodedImage::parse("data:text/plain;base64,aGk="),
            Err(DecodeError::MalformedDataUrl)
        ));
        assert!(matches!(
            EncodedImage::parse("data:image/png;base64,"),
            Err(DecodeError::MalformedDataUrl)
        ));
    }

    #[test]
    fn test_parse_checks_payload() {
        assert!(matches!(
            EncodedImage::parse("data:image/png;base64,!!!!"),
            Err(DecodeError::MalformedDataUrl)
        ));

        // "hello" is valid base64, but not an image.
        assert!(matches!(
            EncodedImage::parse("data:image/png;base64,aGVsbG8="),
            Err(DecodeError::UnsupportedFile { .. })
        ));

        // A PNG signature alone has no readable header.
        assert!(matches!(
            EncodedImage::parse("data:image/png;base64,iVBORw0KGgo="),
            Err(DecodeError::Image(_))
        ));

        // The declared type is replaced by the sniffed one.
        let relabelled = format!(
            "data:image/jpeg;base64,{}",
            STANDARD.encode(png_sized(2, 2))
        );
        assert_eq!(
            Some("image/png"),
            EncodedImage::parse(&relabelled).unwrap().mime_type()
        );
    }

    #[test]
    fn test_photo_hash_parse() {
        assert_eq!(
            Ok(PhotoHash([50, 148, 53, 229, 230, 107, 232, 9])),
            PhotoHash::try_from("329435e5e66be809")
        );
        assert_eq!(
            Err(PhotoHashParseError::InvalidLength),
            PhotoHash::try_from("329435e5e66b")
        );
        assert_eq!(
            Err(PhotoHashParseError::InvalidHex),
            PhotoHash::try_from("Z29435e5e66be809")
        );
        assert_eq!(
            Err(PhotoHashParseError::InvalidHex),
            PhotoHash::try_from("+f+f+f+f+f+f+f+f")
        );
        assert_eq!(
            Err(PhotoHashParseError::InvalidHex),
            PhotoHash::try_from("329435e5e66be8é")
        );
        assert_eq!(
            "329435e5e66be809",
            PhotoHash::try_from("329435e5e66be809").unwrap().to_string()
        );
    }

    #[test]
    fn test_hash_is_content_addressed() {
        let a = EncodedImage::from("data:image/png;base64,AAAA".to_string());
        let b = EncodedImage::from("data:image/png;base64,AAAA".to_string());
        let c = EncodedImage::from("data:image/png;base64,AAAB".to_string());

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }
}
