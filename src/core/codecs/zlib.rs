//! High-effort zlib recompression via zopfli.
//!
//! Used for the XML/RELS entries of office bundles and for PDF flate
//! streams. Iteration counts trade time for ratio; callers pick the effort
//! (office entries default to 15 iterations, PDF streams to 40, matching
//! the cost profile of each call site).

use crate::error::OptiPackError;
use std::io::Read;
use std::num::NonZeroU64;

/// Compress `data` into a zlib container at high effort.
pub fn compress_zlib(data: &[u8], iterations: u64) -> crate::Result<Vec<u8>> {
    let options = zopfli::Options {
        iteration_count: NonZeroU64::new(iterations.max(1)).unwrap_or(NonZeroU64::MIN),
        ..zopfli::Options::default()
    };

    let mut out = Vec::new();
    zopfli::compress(options, zopfli::Format::Zlib, data, &mut out)
        .map_err(|e| OptiPackError::codec("zopfli", e.to_string()))?;
    Ok(out)
}

/// Decompress a zlib stream (verification helper).
pub fn decompress_zlib(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| OptiPackError::codec("zlib", e.to_string()))?;
    Ok(out)
}

/// Recompress and verify the stream round-trips to the original bytes.
pub fn compress_zlib_verified(data: &[u8], iterations: u64) -> crate::Result<Vec<u8>> {
    let out = compress_zlib(data, iterations)?;
    let roundtrip = decompress_zlib(&out)?;
    if roundtrip != data {
        return Err(OptiPackError::codec(
            "zopfli",
            "verification failed: decoded stream differs from input",
        ));
    }
    Ok(out)
}
