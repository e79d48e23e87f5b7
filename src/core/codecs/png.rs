//! Lossless PNG optimization.
//!
//! Wraps oxipng behind the [`LeafCodec`] interface and exposes the
//! [`PngProcessor`] registered for `image/png` leaves. Metadata chunks
//! (tEXt/zTXt/iTXt/eXIf and friends) survive when `preserve_metadata` is
//! set; otherwise only safe-to-strip chunks are removed.

use super::{CodecChain, CodecRun, LeafCodec};
use crate::core::registry::{Processor, RecompressOptions};
use crate::error::OptiPackError;
use std::fs;
use std::path::Path;

/// Optimize a PNG byte stream losslessly.
pub fn optimize_png(data: &[u8], preserve_metadata: bool) -> crate::Result<Vec<u8>> {
    let mut options = oxipng::Options::from_preset(3);
    options.strip = if preserve_metadata {
        oxipng::StripChunks::None
    } else {
        oxipng::StripChunks::Safe
    };

    oxipng::optimize_from_memory(data, &options)
        .map_err(|e| OptiPackError::codec("oxipng", e.to_string()))
}

/// PNG leaf codec.
pub struct PngCodec;

impl LeafCodec for PngCodec {
    fn name(&self) -> &'static str {
        "oxipng"
    }

    fn compress(&self, input: &[u8], opts: &RecompressOptions) -> crate::Result<Vec<u8>> {
        optimize_png(input, opts.preserve_metadata)
    }
}

/// Leaf processor for standalone PNG files.
pub struct PngProcessor;

impl PngProcessor {
    pub fn new() -> Self {
        Self
    }

    fn chain() -> CodecChain {
        CodecChain::new(vec![Box::new(PngCodec)])
    }
}

impl Default for PngProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for PngProcessor {
    fn name(&self) -> &'static str {
        "png"
    }

    fn handles_mime(&self, mime: &str) -> bool {
        mime == "image/png"
    }

    fn handles_extension(&self, ext: &str) -> bool {
        ext == ".png"
    }

    fn can_recompress(&self) -> bool {
        true
    }

    fn recompress(
        &self,
        input: &Path,
        output: &Path,
        opts: &RecompressOptions,
    ) -> crate::Result<Vec<CodecRun>> {
        let data = fs::read(input)?;
        let (best, runs) = Self::chain().run(&data, opts)?;
        fs::write(output, best)?;
        Ok(runs)
    }
}
