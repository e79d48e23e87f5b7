//! Leaf recompression codecs and their composition.
//!
//! A [`LeafCodec`] turns bytes into smaller bytes, losslessly. Codecs
//! compose through a [`CodecChain`] in one of two modes: `Pipe` feeds each
//! codec the previous codec's output, `Parallel` runs every codec on the
//! source and keeps the smallest result. A codec that grows its input never
//! wins; the chain keeps the smaller side at every step.

pub mod png;
pub mod zlib;

use crate::core::formats::EncodeMode;
use crate::core::registry::RecompressOptions;

/// One codec application and the size reduction it achieved, in percent of
/// its input.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecRun {
    pub codec: String,
    pub reduction_pct: f64,
}

impl CodecRun {
    fn new(codec: &str, input_len: usize, output_len: usize) -> Self {
        let reduction_pct = if input_len > 0 {
            100.0 * (1.0 - output_len as f64 / input_len as f64)
        } else {
            0.0
        };
        Self {
            codec: codec.to_string(),
            reduction_pct,
        }
    }
}

/// A lossless byte-to-byte recompressor.
pub trait LeafCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, input: &[u8], opts: &RecompressOptions) -> crate::Result<Vec<u8>>;
}

/// Ordered set of candidate codecs for one file family.
pub struct CodecChain {
    codecs: Vec<Box<dyn LeafCodec>>,
}

impl CodecChain {
    pub fn new(codecs: Vec<Box<dyn LeafCodec>>) -> Self {
        Self { codecs }
    }

    /// Run the chain over `input` in the given mode.
    ///
    /// Returns the best output (never larger than `input`) and the ordered
    /// codec runs for reporting.
    pub fn run(
        &self,
        input: &[u8],
        opts: &RecompressOptions,
    ) -> crate::Result<(Vec<u8>, Vec<CodecRun>)> {
        match opts.encode_mode {
            EncodeMode::Pipe => self.run_pipe(input, opts),
            EncodeMode::Parallel => self.run_parallel(input, opts),
        }
    }

    fn run_pipe(
        &self,
        input: &[u8],
        opts: &RecompressOptions,
    ) -> crate::Result<(Vec<u8>, Vec<CodecRun>)> {
        let mut current = input.to_vec();
        let mut runs = Vec::new();
        for codec in &self.codecs {
            let out = codec.compress(&current, opts)?;
            runs.push(CodecRun::new(codec.name(), current.len(), out.len()));
            if out.len() < current.len() {
                current = out;
            }
        }
        Ok((current, runs))
    }

    fn run_parallel(
        &self,
        input: &[u8],
        opts: &RecompressOptions,
    ) -> crate::Result<(Vec<u8>, Vec<CodecRun>)> {
        let mut best = input.to_vec();
        let mut runs = Vec::new();
        for codec in &self.codecs {
            let out = codec.compress(input, opts)?;
            runs.push(CodecRun::new(codec.name(), input.len(), out.len()));
            if out.len() < best.len() {
                best = out;
            }
        }
        Ok((best, runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TruncateCodec {
        name: &'static str,
        keep: usize,
    }

    impl LeafCodec for TruncateCodec {
        fn name(&self) -> &'static str {
            self.name
        }
        fn compress(&self, input: &[u8], _opts: &RecompressOptions) -> crate::Result<Vec<u8>> {
            Ok(input[..input.len().min(self.keep)].to_vec())
        }
    }

    struct GrowCodec;

    impl LeafCodec for GrowCodec {
        fn name(&self) -> &'static str {
            "grow"
        }
        fn compress(&self, input: &[u8], _opts: &RecompressOptions) -> crate::Result<Vec<u8>> {
            let mut out = input.to_vec();
            out.push(0xFF);
            Ok(out)
        }
    }

    fn opts(mode: EncodeMode) -> RecompressOptions {
        RecompressOptions {
            encode_mode: mode,
            ..RecompressOptions::default()
        }
    }

    #[test]
    fn test_pipe_feeds_each_codec_the_previous_output() {
        let chain = CodecChain::new(vec![
            Box::new(TruncateCodec {
                name: "half",
                keep: 50,
            }),
            Box::new(TruncateCodec {
                name: "quarter",
                keep: 25,
            }),
        ]);
        let input = vec![1u8; 100];
        let (out, runs) = chain.run(&input, &opts(EncodeMode::Pipe)).unwrap();
        assert_eq!(out.len(), 25);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].codec, "half");
        assert!((runs[0].reduction_pct - 50.0).abs() < 1e-9);
        assert!((runs[1].reduction_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_keeps_the_smallest_candidate() {
        let chain = CodecChain::new(vec![
            Box::new(TruncateCodec {
                name: "a",
                keep: 80,
            }),
            Box::new(TruncateCodec {
                name: "b",
                keep: 30,
            }),
            Box::new(TruncateCodec {
                name: "c",
                keep: 60,
            }),
        ]);
        let input = vec![1u8; 100];
        let (out, runs) = chain.run(&input, &opts(EncodeMode::Parallel)).unwrap();
        assert_eq!(out.len(), 30);
        assert_eq!(runs.len(), 3);
        // every candidate ran on the original input
        assert!((runs[0].reduction_pct - 20.0).abs() < 1e-9);
        assert!((runs[2].reduction_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_growing_codec_never_wins() {
        let chain = CodecChain::new(vec![Box::new(GrowCodec)]);
        let input = vec![1u8; 10];
        let (out, runs) = chain.run(&input, &opts(EncodeMode::Pipe)).unwrap();
        assert_eq!(out, input);
        assert!(runs[0].reduction_pct < 0.0);

        let (out, _) = chain.run(&input, &opts(EncodeMode::Parallel)).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_codec_run_reduction_math() {
        let run = CodecRun::new("x", 200, 150);
        assert!((run.reduction_pct - 25.0).abs() < 1e-9);
        let run = CodecRun::new("x", 0, 0);
        assert_eq!(run.reduction_pct, 0.0);
    }
}
