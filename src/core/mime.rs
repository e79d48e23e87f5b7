//! MIME type detection.
//!
//! Detection is content-first: magic bytes via the `infer` crate, which also
//! discriminates the ZIP-bundled office families by peeking at the archive's
//! local entries. Plain-ZIP results are refined by the extension table
//! (a `.cbz` is a ZIP by magic but a comic book by contract), and renamed
//! ZIP bundles are resolved by reading their `mimetype` entry. Files nothing
//! recognizes yield the empty string.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

// extension (with dot, lowercase) -> mime
static EXT_TO_MIME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // archives
        (".zip", "application/zip"),
        (".7z", "application/x-7z-compressed"),
        (".cb7", "application/x-7z-compressed"),
        (".tar", "application/x-tar"),
        (".gz", "application/gzip"),
        (".tgz", "application/gzip"),
        (".bz2", "application/x-bzip2"),
        (".xz", "application/x-xz"),
        (".wim", "application/x-ms-wim"),
        (".rar", "application/vnd.rar"),
        (".cbr", "application/vnd.comicbook+rar"),
        (".epub", "application/epub+zip"),
        (".cbz", "application/vnd.comicbook+zip"),
        (".cbt", "application/vnd.comicbook+tar"),
        (".jar", "application/java-archive"),
        (".xpi", "application/x-xpinstall"),
        (".ora", "image/openraster"),
        (".dwfx", "model/vnd.dwfx+xps"),
        (".xps", "application/vnd.ms-xpsdocument"),
        (".oxps", "application/oxps"),
        (".apk", "application/vnd.android.package-archive"),
        // images
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
        (".png", "image/png"),
        (".gif", "image/gif"),
        (".tif", "image/tiff"),
        (".tiff", "image/tiff"),
        (".webp", "image/webp"),
        (".svg", "image/svg+xml"),
        // documents
        (
            ".docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        (
            ".xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        (
            ".pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        (".odt", "application/vnd.oasis.opendocument.text"),
        (".ods", "application/vnd.oasis.opendocument.spreadsheet"),
        (".odp", "application/vnd.oasis.opendocument.presentation"),
        (".odg", "application/vnd.oasis.opendocument.graphics"),
        (".odf", "application/vnd.oasis.opendocument.formula"),
        (".pdf", "application/pdf"),
    ])
});

/// ZIP specializations that magic-byte sniffing reports as plain ZIP.
const ZIP_SPECIALIZATIONS: &[&str] = &[
    ".cbz", ".jar", ".xpi", ".ora", ".dwfx", ".xps", ".oxps", ".apk", ".epub",
];

/// Content-based MIME detector with extension fallback.
pub struct MimeDetector;

impl MimeDetector {
    /// Detect the MIME type of a file on disk.
    ///
    /// Returns the empty string when the type cannot be determined.
    pub fn detect(path: &Path) -> String {
        let mut head = [0u8; 8192];
        let len = match File::open(path).and_then(|mut f| f.read(&mut head)) {
            Ok(n) => n,
            Err(e) => {
                log::debug!(target: "mime", "cannot read {}: {}", path.display(), e);
                return Self::extension_mime(path);
            }
        };
        if len == 0 {
            return String::new();
        }

        let ext = dot_extension(path);

        if let Some(kind) = infer::get(&head[..len]) {
            let mime = kind.mime_type();
            if mime == "application/zip" {
                return Self::refine_zip(path, &ext);
            }
            return mime.to_string();
        }

        Self::extension_mime(path)
    }

    /// Resolve a plain-ZIP detection into its specialized family.
    ///
    /// Extension wins when it names a known ZIP specialization; otherwise a
    /// `mimetype` entry inside the archive (EPUB/ODF/ORA convention) is
    /// consulted, and plain ZIP is the answer of last resort.
    fn refine_zip(path: &Path, ext: &str) -> String {
        if ZIP_SPECIALIZATIONS.contains(&ext) {
            if let Some(mime) = EXT_TO_MIME.get(ext) {
                return (*mime).to_string();
            }
        }
        if let Some(mime) = EXT_TO_MIME.get(ext) {
            // office extensions over a zip body
            if mime.starts_with("application/vnd.openxmlformats")
                || mime.starts_with("application/vnd.oasis.opendocument")
            {
                return (*mime).to_string();
            }
        }
        if let Some(declared) = Self::read_zip_mimetype(path) {
            return declared;
        }
        "application/zip".to_string()
    }

    /// Read the `mimetype` entry of a ZIP bundle, if present.
    fn read_zip_mimetype(path: &Path) -> Option<String> {
        let file = File::open(path).ok()?;
        let mut archive = zip::ZipArchive::new(file).ok()?;
        let mut entry = archive.by_name("mimetype").ok()?;
        let mut declared = String::new();
        entry.read_to_string(&mut declared).ok()?;
        let declared = declared.trim().to_ascii_lowercase();
        if declared.is_empty() {
            None
        } else {
            Some(declared)
        }
    }

    /// Extension-table fallback.
    fn extension_mime(path: &Path) -> String {
        let ext = dot_extension(path);
        EXT_TO_MIME
            .get(ext.as_str())
            .map(|m| (*m).to_string())
            .unwrap_or_default()
    }
}

/// Lowercased extension of `path` including the leading dot, or empty.
pub fn dot_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            let options: zip::write::FileOptions =
                zip::write::FileOptions::default()
                    .compression_method(zip::CompressionMethod::Stored);
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detect_png_by_magic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("image.dat");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest-of-file").unwrap();
        assert_eq!(MimeDetector::detect(&path), "image/png");
    }

    #[test]
    fn test_detect_pdf_by_magic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.bin");
        std::fs::write(&path, b"%PDF-1.7\n%%EOF\n").unwrap();
        assert_eq!(MimeDetector::detect(&path), "application/pdf");
    }

    #[test]
    fn test_detect_zip_specialization_by_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comic.cbz");
        write_zip(&path, &[("01.png", b"xx"), ("02.png", b"yy")]);
        assert_eq!(
            MimeDetector::detect(&path),
            "application/vnd.comicbook+zip"
        );
    }

    #[test]
    fn test_detect_renamed_bundle_via_mimetype_entry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("painting.dat");
        write_zip(
            &path,
            &[("mimetype", b"image/openraster"), ("data/layer0.png", b"x")],
        );
        assert_eq!(MimeDetector::detect(&path), "image/openraster");
    }

    #[test]
    fn test_plain_zip_stays_zip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundle.zip");
        write_zip(&path, &[("readme.txt", b"hello")]);
        assert_eq!(MimeDetector::detect(&path), "application/zip");
    }

    #[test]
    fn test_extension_fallback_for_unrecognized_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.tar");
        // not a real tar; too short for magic at offset 257
        std::fs::write(&path, b"plain text").unwrap();
        assert_eq!(MimeDetector::detect(&path), "application/x-tar");
    }

    #[test]
    fn test_empty_and_unknown() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(MimeDetector::detect(&empty), "");

        let unknown = tmp.path().join("who.knows");
        std::fs::write(&unknown, b"some opaque bytes").unwrap();
        assert_eq!(MimeDetector::detect(&unknown), "");
    }

    #[test]
    fn test_dot_extension() {
        assert_eq!(dot_extension(Path::new("a/b/C.PNG")), ".png");
        assert_eq!(dot_extension(Path::new("noext")), "");
    }
}
