use std::{fmt, str::FromStr};

/// V4L2 style format code. Codes shorter than four characters are
/// space padded (`"Y16 "`); the all-zero code marks an unknown format.
///
/// ```rust
/// use prism_core::prelude::{FourCc, PixelFormat};
///
/// let code: FourCc = "Y16 ".parse().unwrap();
/// assert_eq!(PixelFormat::from_fourcc(code), PixelFormat::Y16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == [0; 4]
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            self.0.iter().try_for_each(|&b| write!(f, "{}", b as char))
        } else {
            let [a, b, c, d] = self.0;
            write!(f, "{a:02x}{b:02x}{c:02x}{d:02x}")
        }
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("'{s}' is not a four character code"))?;
        if !code.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(format!("'{s}' contains non-printable characters"));
        }
        Ok(FourCc(code))
    }
}

/// Pixel layout of an [`Image`](crate::image::Image).
///
/// # Example
/// ```rust
/// use prism_core::prelude::PixelFormat;
///
/// assert_eq!(PixelFormat::Bgr.bytes_per_pixel(), Some(3));
/// assert_eq!("yuyv".parse::<PixelFormat>().unwrap(), PixelFormat::Yuyv);
/// assert_eq!(PixelFormat::Gray.fourcc().to_string(), "GREY");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Unknown,
    /// Motion-JPEG; every image is a complete JPEG stream.
    Mjpeg,
    /// Packed 4:2:2, byte order Y0 U Y1 V.
    Yuyv,
    /// 16-bit little-endian, red in the top 5 bits.
    Rgb565,
    /// 24-bit blue, green, red.
    Bgr,
    /// 8-bit luma.
    Gray,
    /// 16-bit little-endian luma.
    Y16,
    /// Packed 4:2:2, byte order U Y0 V Y1.
    Uyvy,
    /// 32-bit blue, green, red, alpha.
    Bgra,
}

impl PixelFormat {
    /// All formats other than `Unknown`.
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::Mjpeg,
        PixelFormat::Yuyv,
        PixelFormat::Rgb565,
        PixelFormat::Bgr,
        PixelFormat::Gray,
        PixelFormat::Y16,
        PixelFormat::Uyvy,
        PixelFormat::Bgra,
    ];

    /// Bytes per pixel for uncompressed layouts; `None` for MJPEG and unknown.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Gray => Some(1),
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Rgb565 | PixelFormat::Y16 => {
                Some(2)
            }
            PixelFormat::Bgr => Some(3),
            PixelFormat::Bgra => Some(4),
            PixelFormat::Mjpeg | PixelFormat::Unknown => None,
        }
    }

    /// Byte length of a tightly packed `width x height` image.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let bpp = self.bytes_per_pixel()?;
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(bpp)
    }

    /// Whether images of this format are JPEG compressed.
    pub const fn is_compressed(self) -> bool {
        matches!(self, PixelFormat::Mjpeg)
    }

    /// V4L2 FourCC for this layout.
    pub const fn fourcc(self) -> FourCc {
        match self {
            PixelFormat::Unknown => FourCc::new([0; 4]),
            PixelFormat::Mjpeg => FourCc::new(*b"MJPG"),
            PixelFormat::Yuyv => FourCc::new(*b"YUYV"),
            PixelFormat::Rgb565 => FourCc::new(*b"RGBP"),
            PixelFormat::Bgr => FourCc::new(*b"BGR3"),
            PixelFormat::Gray => FourCc::new(*b"GREY"),
            PixelFormat::Y16 => FourCc::new(*b"Y16 "),
            PixelFormat::Uyvy => FourCc::new(*b"UYVY"),
            PixelFormat::Bgra => FourCc::new(*b"BGR4"),
        }
    }

    /// Map a V4L2 FourCC back to a pixel format (`JPEG` is treated as MJPEG).
    pub fn from_fourcc(code: FourCc) -> PixelFormat {
        if code == FourCc::new(*b"JPEG") {
            return PixelFormat::Mjpeg;
        }
        Self::ALL
            .into_iter()
            .find(|fmt| fmt.fourcc() == code)
            .unwrap_or(PixelFormat::Unknown)
    }

    /// Lowercase name used in settings documents.
    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Unknown => "unknown",
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Yuyv => "yuyv",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Bgr => "bgr",
            PixelFormat::Gray => "gray",
            PixelFormat::Y16 => "y16",
            PixelFormat::Uyvy => "uyvy",
            PixelFormat::Bgra => "bgra",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|fmt| fmt.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pixel format '{s}'"))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PixelFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PixelFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PixelFormatVisitor;

        impl<'de> serde::de::Visitor<'de> for PixelFormatVisitor {
            type Value = PixelFormat;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a pixel format name such as \"mjpeg\" or \"bgr\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                PixelFormat::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(PixelFormatVisitor)
    }
}

/// Capture mode of a source: pixel format, resolution and frame rate.
///
/// Zero fields mean "not set".
///
/// # Example
/// ```rust
/// use prism_core::prelude::{PixelFormat, VideoMode};
///
/// let mode = VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30);
/// assert!(mode.is_complete());
/// assert!(!VideoMode::default().is_complete());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoMode {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    pub const fn new(pixel_format: PixelFormat, width: u32, height: u32, fps: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            fps,
        }
    }

    /// All of pixel format, width, height and fps are set.
    pub fn is_complete(&self) -> bool {
        self.pixel_format != PixelFormat::Unknown
            && self.width != 0
            && self.height != 0
            && self.fps != 0
    }
}
