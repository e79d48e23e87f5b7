//! Container format taxonomy and capability tables.
//!
//! This module defines the closed [`ContainerFormat`] enumeration over every
//! container family the engine recognizes, together with the MIME and
//! extension lookup tables and the two capability bits each format carries:
//! whether the engine can *extract* it and whether it can *rebuild* it.
//!
//! The distinction matters for the finalize path: a readable but unwritable
//! container (e.g. RAR) can only be re-emitted into a different format when
//! the user supplies a fallback via `--recompress-unencodable`.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Closed enumeration of container families recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Zip,
    SevenZip,
    Tar,
    GZip,
    BZip2,
    Xz,
    Rar,
    Wim,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Ods,
    Odt,
    Odp,
    Odg,
    Odf,
    Epub,
    Cbz,
    Cbt,
    Jar,
    Xpi,
    Ora,
    Dwfx,
    Xps,
    Apk,
    Unknown,
}

/// Codec composition strategy, forwarded opaquely to leaf codecs.
///
/// `Pipe` feeds each codec the previous codec's output; `Parallel` runs all
/// candidate codecs independently on the source and keeps the smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeMode {
    Pipe,
    Parallel,
}

impl Default for EncodeMode {
    fn default() -> Self {
        EncodeMode::Pipe
    }
}

// MIME -> format
static MIME_TO_FORMAT: Lazy<HashMap<&'static str, ContainerFormat>> = Lazy::new(|| {
    use ContainerFormat::*;
    HashMap::from([
        ("application/zip", Zip),
        ("application/x-zip-compressed", Zip),
        ("application/x-7z-compressed", SevenZip),
        ("application/x-tar", Tar),
        ("application/gzip", GZip),
        ("application/x-bzip2", BZip2),
        ("application/x-xz", Xz),
        ("application/vnd.rar", Rar),
        ("application/x-rar-compressed", Rar),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Docx,
        ),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Xlsx,
        ),
        ("application/vnd.ms-powerpoint", Pptx),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            Pptx,
        ),
        ("application/vnd.oasis.opendocument.presentation", Odp),
        ("application/vnd.oasis.opendocument.spreadsheet", Ods),
        ("application/vnd.oasis.opendocument.text", Odt),
        ("application/vnd.oasis.opendocument.graphics", Odg),
        ("application/vnd.oasis.opendocument.formula", Odf),
        ("application/pdf", Pdf),
        ("application/x-ms-wim", Wim),
        ("application/epub+zip", Epub),
        ("application/vnd.comicbook+zip", Cbz),
        ("application/vnd.comicbook+tar", Cbt),
        ("application/java-archive", Jar),
        ("application/x-xpinstall", Xpi),
        ("image/openraster", Ora),
        ("model/vnd.dwfx+xps", Dwfx),
        ("application/vnd.ms-xpsdocument", Xps),
        ("application/oxps", Xps),
        ("application/vnd.android.package-archive", Apk),
    ])
});

impl ContainerFormat {
    /// Look up a format from a MIME string (lowercase ASCII).
    pub fn from_mime(mime: &str) -> Option<ContainerFormat> {
        MIME_TO_FORMAT.get(mime).copied()
    }

    /// Parse a format from a bare extension or format name, e.g. `"zip"`,
    /// `"gz"`, `"gzip"`. Case-insensitive.
    pub fn parse(s: &str) -> Option<ContainerFormat> {
        use ContainerFormat::*;
        let s = s.to_ascii_lowercase();
        let fmt = match s.as_str() {
            "zip" => Zip,
            "7z" => SevenZip,
            "tar" => Tar,
            "gz" | "gzip" => GZip,
            "bz2" | "bzip2" => BZip2,
            "xz" => Xz,
            "wim" => Wim,
            "rar" => Rar,
            "pdf" => Pdf,
            "docx" => Docx,
            "xlsx" => Xlsx,
            "pptx" => Pptx,
            "ods" => Ods,
            "odt" => Odt,
            "odp" => Odp,
            "odg" => Odg,
            "odf" => Odf,
            "epub" => Epub,
            "cbz" => Cbz,
            "cbt" => Cbt,
            "jar" => Jar,
            "xpi" => Xpi,
            "ora" => Ora,
            "dwfx" => Dwfx,
            "xps" | "oxps" => Xps,
            "apk" => Apk,
            _ => return None,
        };
        Some(fmt)
    }

    /// Canonical file extension for this format, without the leading dot.
    pub fn extension(&self) -> &'static str {
        use ContainerFormat::*;
        match self {
            Zip => "zip",
            SevenZip => "7z",
            Tar => "tar",
            GZip => "gz",
            BZip2 => "bz2",
            Xz => "xz",
            Wim => "wim",
            Pdf => "pdf",
            Rar => "rar",
            Docx => "docx",
            Xlsx => "xlsx",
            Pptx => "pptx",
            Ods => "ods",
            Odt => "odt",
            Odp => "odp",
            Odg => "odg",
            Odf => "odf",
            Epub => "epub",
            Cbz => "cbz",
            Cbt => "cbt",
            Jar => "jar",
            Xpi => "xpi",
            Ora => "ora",
            Dwfx => "dwfx",
            Xps => "xps",
            Apk => "apk",
            Unknown => "unknown",
        }
    }

    /// Short prefix used when naming this format's extraction temp dirs.
    pub fn temp_prefix(&self) -> &'static str {
        use ContainerFormat::*;
        match self {
            Docx => "docx",
            Xlsx => "xlsx",
            Pptx => "pptx",
            Odt | Ods | Odp | Odg | Odf => "odf",
            Pdf => "pdf",
            _ => "archive",
        }
    }

    /// Whether this engine can extract the format.
    ///
    /// RAR, WIM and 7z are recognized but have no extraction support here;
    /// they are reported as unsupported during analysis.
    pub fn is_readable(&self) -> bool {
        use ContainerFormat::*;
        !matches!(self, SevenZip | Rar | Wim | Unknown)
    }

    /// Whether this engine can rebuild the format.
    pub fn is_writable(&self) -> bool {
        use ContainerFormat::*;
        !matches!(self, SevenZip | Rar | Wim | Unknown)
    }

    /// True for the ZIP-bundled office document families (OOXML and ODF).
    pub fn is_office(&self) -> bool {
        use ContainerFormat::*;
        matches!(self, Docx | Xlsx | Pptx | Odt | Ods | Odp | Odg | Odf)
    }

    /// True for the OOXML subset, which requires `[Content_Types].xml` to be
    /// the first archive entry.
    pub fn is_ooxml(&self) -> bool {
        use ContainerFormat::*;
        matches!(self, Docx | Xlsx | Pptx)
    }

    /// True for comic book archives, which are rebuilt in natural
    /// (numeric-aware) entry order.
    pub fn is_comic(&self) -> bool {
        use ContainerFormat::*;
        matches!(self, Cbz | Cbt)
    }

    /// True for formats whose replacement invalidates a digital signature
    /// and therefore gets a `.bak` copy of the original before the rename.
    pub fn needs_backup(&self) -> bool {
        use ContainerFormat::*;
        matches!(self, Xpi | Apk)
    }

    /// ZIP-based formats (everything the generic ZIP reader/writer handles).
    pub fn is_zip_based(&self) -> bool {
        use ContainerFormat::*;
        matches!(
            self,
            Zip | Epub | Cbz | Jar | Xpi | Ora | Dwfx | Xps | Apk
        ) || self.is_office()
    }

    /// Detect the format of a file on disk: MIME first, extension fallback,
    /// with `tar.gz`/`tar.bz2`/`tar.xz` resolving to their outer compression
    /// layer so the inner tar is discovered by recursion.
    pub fn detect(path: &Path, mime: &str) -> ContainerFormat {
        if !mime.is_empty() {
            if let Some(fmt) = ContainerFormat::from_mime(mime) {
                return fmt;
            }
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if let Some(fmt) = ContainerFormat::parse(&ext) {
            return fmt;
        }

        ContainerFormat::Unknown
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mime_lookup() {
        assert_eq!(
            ContainerFormat::from_mime("application/zip"),
            Some(ContainerFormat::Zip)
        );
        assert_eq!(
            ContainerFormat::from_mime("application/epub+zip"),
            Some(ContainerFormat::Epub)
        );
        assert_eq!(
            ContainerFormat::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            Some(ContainerFormat::Docx)
        );
        assert_eq!(ContainerFormat::from_mime("text/plain"), None);
        assert_eq!(ContainerFormat::from_mime(""), None);
    }

    #[test]
    fn test_parse_and_extension_roundtrip() {
        for name in ["zip", "tar", "gz", "bz2", "xz", "pdf", "docx", "epub", "cbz"] {
            let fmt = ContainerFormat::parse(name).unwrap();
            assert_eq!(fmt.extension(), name);
        }
        assert_eq!(
            ContainerFormat::parse("GZIP"),
            Some(ContainerFormat::GZip)
        );
        assert_eq!(ContainerFormat::parse("oxps"), Some(ContainerFormat::Xps));
        assert_eq!(ContainerFormat::parse("mkv"), None);
    }

    #[test]
    fn test_capability_bits() {
        assert!(ContainerFormat::Zip.is_readable());
        assert!(ContainerFormat::Zip.is_writable());
        assert!(ContainerFormat::Pdf.is_readable());
        assert!(!ContainerFormat::Rar.is_readable());
        assert!(!ContainerFormat::Rar.is_writable());
        assert!(!ContainerFormat::Wim.is_writable());
        assert!(!ContainerFormat::SevenZip.is_writable());
        assert!(!ContainerFormat::Unknown.is_readable());
    }

    #[test]
    fn test_family_predicates() {
        assert!(ContainerFormat::Docx.is_ooxml());
        assert!(ContainerFormat::Docx.is_office());
        assert!(ContainerFormat::Odt.is_office());
        assert!(!ContainerFormat::Odt.is_ooxml());
        assert!(ContainerFormat::Cbz.is_comic());
        assert!(ContainerFormat::Cbt.is_comic());
        assert!(ContainerFormat::Xpi.needs_backup());
        assert!(ContainerFormat::Apk.needs_backup());
        assert!(!ContainerFormat::Zip.needs_backup());
        assert!(ContainerFormat::Epub.is_zip_based());
        assert!(!ContainerFormat::Tar.is_zip_based());
    }

    #[test]
    fn test_detect_prefers_mime_over_extension() {
        let path = PathBuf::from("misnamed.txt");
        assert_eq!(
            ContainerFormat::detect(&path, "application/zip"),
            ContainerFormat::Zip
        );
    }

    #[test]
    fn test_detect_extension_fallback() {
        let path = PathBuf::from("file.CBZ");
        assert_eq!(
            ContainerFormat::detect(&path, ""),
            ContainerFormat::Cbz
        );
        let path = PathBuf::from("file.dat");
        assert_eq!(
            ContainerFormat::detect(&path, ""),
            ContainerFormat::Unknown
        );
    }

    #[test]
    fn test_detect_tarball_outer_layer() {
        // the gzip layer wins; the inner tar is found by recursion
        let path = PathBuf::from("backup.tar.gz");
        assert_eq!(
            ContainerFormat::detect(&path, "application/gzip"),
            ContainerFormat::GZip
        );
        assert_eq!(ContainerFormat::detect(&path, ""), ContainerFormat::GZip);
    }
}
