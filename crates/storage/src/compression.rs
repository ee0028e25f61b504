//! Page and envelope compression.
//!
//! Settings use the integer encoding `algorithm * 100 + level`. A compressed
//! blob starts with a one-byte codec tag; blobs whose stored size equals their
//! logical size are raw and bypass decompression.

use quiver_core::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// Compression algorithms understood by the storage engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    None,
    Lz4,
    Zstd,
}

impl CompressionAlgorithm {
    fn code(&self) -> u32 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 4,
            CompressionAlgorithm::Zstd => 5,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(CompressionAlgorithm::None),
            4 => Some(CompressionAlgorithm::Lz4),
            5 => Some(CompressionAlgorithm::Zstd),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        self.code() as u8
    }
}

/// Algorithm and level, encoded as `algorithm * 100 + level`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressionSettings(u32);

impl CompressionSettings {
    /// Stores pages uncompressed.
    pub const NONE: CompressionSettings = CompressionSettings(0);
    /// LZ4 block compression.
    pub const LZ4: CompressionSettings = CompressionSettings(404);
    /// Zstandard at level 5.
    pub const ZSTD: CompressionSettings = CompressionSettings(505);

    /// Decodes an integer setting.
    pub fn from_code(code: u32) -> Result<Self> {
        if code == 0 {
            return Ok(Self::NONE);
        }
        match CompressionAlgorithm::from_code(code / 100) {
            Some(CompressionAlgorithm::None) | None => Err(Error::invalid_operation(format!(
                "unknown compression setting: {}",
                code
            ))),
            Some(_) => Ok(CompressionSettings(code)),
        }
    }

    /// Builds a setting from its parts.
    pub fn new(algorithm: CompressionAlgorithm, level: u32) -> Self {
        match algorithm {
            CompressionAlgorithm::None => Self::NONE,
            other => CompressionSettings(other.code() * 100 + level.min(99)),
        }
    }

    #[inline]
    pub fn code(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::from_code(self.0 / 100).unwrap_or(CompressionAlgorithm::None)
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.0 % 100
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.algorithm() != CompressionAlgorithm::None
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self::LZ4
    }
}

impl fmt::Debug for CompressionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.algorithm(), self.level())
    }
}

/// A compression codec.
pub trait Codec: Send + Sync {
    /// Compresses `src` at the given level.
    fn compress(&self, src: &[u8], level: u32) -> Result<Vec<u8>>;

    /// Decompresses `src` into exactly `logical_len` bytes.
    fn decompress(&self, src: &[u8], logical_len: usize) -> Result<Vec<u8>>;
}

/// LZ4 block codec; the level is ignored.
#[derive(Debug, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, src: &[u8], _level: u32) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress(src))
    }

    fn decompress(&self, src: &[u8], logical_len: usize) -> Result<Vec<u8>> {
        lz4_flex::decompress(src, logical_len).map_err(|e| Error::compression(e.to_string()))
    }
}

/// Zstandard codec.
#[derive(Debug, Default)]
pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn compress(&self, src: &[u8], level: u32) -> Result<Vec<u8>> {
        zstd::bulk::compress(src, level as i32).map_err(|e| Error::compression(e.to_string()))
    }

    fn decompress(&self, src: &[u8], logical_len: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(src, logical_len).map_err(|e| Error::compression(e.to_string()))
    }
}

fn codec_for(algorithm: CompressionAlgorithm) -> Option<&'static dyn Codec> {
    static LZ4: Lz4Codec = Lz4Codec;
    static ZSTD: ZstdCodec = ZstdCodec;
    match algorithm {
        CompressionAlgorithm::None => None,
        CompressionAlgorithm::Lz4 => Some(&LZ4),
        CompressionAlgorithm::Zstd => Some(&ZSTD),
    }
}

/// Compresses blobs according to fixed settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct Compressor {
    settings: CompressionSettings,
}

impl Compressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self { settings }
    }

    #[inline]
    pub fn settings(&self) -> CompressionSettings {
        self.settings
    }

    /// Returns the bytes to store for `src`.
    ///
    /// The result is `src` itself when compression is disabled or does not
    /// make the blob smaller.
    pub fn zip<'a>(&self, src: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let algorithm = self.settings.algorithm();
        let codec = match codec_for(algorithm) {
            Some(codec) if !src.is_empty() => codec,
            _ => return Ok(Cow::Borrowed(src)),
        };
        let compressed = codec.compress(src, self.settings.level())?;
        if compressed.len() + 1 >= src.len() {
            return Ok(Cow::Borrowed(src));
        }
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(algorithm.tag());
        out.extend_from_slice(&compressed);
        Ok(Cow::Owned(out))
    }
}

/// Restores a stored blob to its logical bytes.
pub fn unzip(src: &[u8], logical_len: usize) -> Result<Cow<'_, [u8]>> {
    if src.len() == logical_len {
        return Ok(Cow::Borrowed(src));
    }
    let (&tag, payload) = src
        .split_first()
        .ok_or_else(|| Error::compression("empty compressed blob"))?;
    let codec = CompressionAlgorithm::from_code(tag as u32)
        .and_then(codec_for)
        .ok_or_else(|| Error::compression(format!("unknown codec tag {}", tag)))?;
    let out = codec.decompress(payload, logical_len)?;
    if out.len() != logical_len {
        return Err(Error::compression(format!(
            "decompressed {} bytes, expected {}",
            out.len(),
            logical_len
        )));
    }
    Ok(Cow::Owned(out))
}
