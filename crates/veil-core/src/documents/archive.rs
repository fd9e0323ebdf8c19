//! ZIP export of finished documents.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::RenderError;

/// File name used when exporting every finished document at once.
pub const DEFAULT_ARCHIVE_NAME: &str = "anonymized_documents.zip";

/// Bundle `(file name, bytes)` pairs into a single ZIP archive.
///
/// Entries keep their order. A name that repeats gets a ` (n)` suffix before
/// its extension so no document is dropped.
pub fn bundle_zip<I, N, B>(entries: I) -> Result<Vec<u8>, RenderError>
where
    I: IntoIterator<Item = (N, B)>,
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();
    let mut count = 0usize;

    for (name, bytes) in entries {
        let name = unique_name(name.as_ref(), &mut used);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes.as_ref())?;
        count += 1;
    }

    let bytes = zip.finish()?.into_inner();
    tracing::debug!(entries = count, bytes = bytes.len(), "Bundled archive");
    Ok(bytes)
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(String::from).collect::<Vec<_>>()
    }

    #[test]
    fn test_bundles_entries() {
        let bytes = bundle_zip([
            ("anonymized_a.docx", b"first".to_vec()),
            ("anonymized_b.docx", b"second".to_vec()),
        ])
        .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("anonymized_b.docx")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");
    }

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let bytes = bundle_zip([
            ("anonymized_a.docx", b"1".as_slice()),
            ("anonymized_a.docx", b"2".as_slice()),
            ("anonymized_a.docx", b"3".as_slice()),
        ])
        .unwrap();

        let mut names = entry_names(&bytes);
        names.sort();
        assert_eq!(
            names,
            vec![
                "anonymized_a (2).docx",
                "anonymized_a (3).docx",
                "anonymized_a.docx"
            ]
        );
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = bundle_zip(Vec::<(String, Vec<u8>)>::new()).unwrap();
        assert!(entry_names(&bytes).is_empty());
    }
}
