//! Manifest encoding and decoding.
//!
//! ```text
//! #!fsum <algorithm> <version>
//! <hex-digest>|<size>|<path or "quoted path">
//! ```
//!
//! A bad header is fatal. A bad entry line is reported with its 1-based
//! line number and the scan moves on to the next line.

use std::fmt;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use fsum_core::{Digest, FailureKind, ItemFailure, PipelineError};
use fsum_scan::WorkItem;

use crate::algorithm::Algorithm;
use crate::quote::{quote_path, unquote_path};

/// First token of every manifest.
pub const MAGIC: &str = "#!fsum";

/// Version recorded in headers written by this build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    /// Algorithm the digests were made with.
    pub algorithm: Algorithm,
    /// Version of the tool that wrote the manifest.
    pub version: String,
}

impl ManifestHeader {
    /// Header for a manifest written by this build.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            version: VERSION.to_string(),
        }
    }

    /// Parse and validate a header line of the manifest called `name`.
    pub fn parse(name: &str, line: &str) -> Result<Self, PipelineError> {
        let fields: Vec<&str> = line.trim_end().split(' ').collect();
        if fields.len() < 3 {
            return Err(PipelineError::corrupt(name, "not enough fields in header"));
        }
        if fields[0] != MAGIC {
            return Err(PipelineError::NotAManifest {
                name: name.to_string(),
            });
        }

        let algorithm = Algorithm::from_name(fields[1]).map_err(|_| {
            PipelineError::corrupt(name, format!("unsupported hash algorithm '{}'", fields[1]))
        })?;

        Ok(Self {
            algorithm,
            version: fields[2].to_string(),
        })
    }
}

impl fmt::Display for ManifestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MAGIC} {} {}", self.algorithm, self.version)
    }
}

/// One entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Expected digest.
    pub digest: Digest,
    /// Expected size in bytes.
    pub size: u64,
    /// Path, unquoted.
    pub path: PathBuf,
    /// 1-based line number, or 0 when the entry was not read from a manifest.
    pub line: usize,
}

impl ManifestEntry {
    /// Create an entry that is not tied to a manifest line.
    pub fn new(digest: Digest, size: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            digest,
            size,
            path: path.into(),
            line: 0,
        }
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.digest, self.size, quote_path(&self.path))
    }
}

impl WorkItem for ManifestEntry {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse one entry line. The error is a message without location.
pub fn parse_line(line: &str, algorithm: Algorithm) -> Result<ManifestEntry, String> {
    let line = line.trim();

    let (digest, rest) = line
        .split_once('|')
        .ok_or_else(|| "malformed checksum".to_string())?;
    let (size, path) = rest
        .split_once('|')
        .ok_or_else(|| "malformed file size".to_string())?;

    let digest = Digest::from_hex(digest)
        .filter(|d| d.len() == algorithm.output_len())
        .ok_or_else(|| "malformed checksum".to_string())?;
    let size: u64 = size
        .parse()
        .map_err(|e| format!("malformed line; size {e}"))?;

    if path.is_empty() {
        return Err("malformed line; empty filename".to_string());
    }
    let path = unquote_path(path).map_err(|e| format!("malformed line; filename {e}"))?;

    Ok(ManifestEntry {
        digest,
        size,
        path,
        line: 0,
    })
}

/// Writes a manifest: the header on creation, then one line per entry.
pub struct ManifestWriter<W: Write> {
    out: BufWriter<W>,
    entries: u64,
}

impl<W: Write> ManifestWriter<W> {
    /// Write the header for `algorithm` and return the writer.
    pub fn new(writer: W, algorithm: Algorithm) -> io::Result<Self> {
        let mut out = BufWriter::new(writer);
        writeln!(out, "{}", ManifestHeader::new(algorithm))?;
        Ok(Self { out, entries: 0 })
    }

    /// Append one entry line.
    pub fn write_entry(&mut self, digest: &Digest, size: u64, path: &Path) -> io::Result<()> {
        writeln!(self.out, "{digest}|{size}|{}", quote_path(path))?;
        self.entries += 1;
        Ok(())
    }

    /// Entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flush and return the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.out.into_inner().map_err(io::IntoInnerError::into_error)
    }
}

/// Reads a manifest line by line.
///
/// Iterating yields every entry line after the header, skipping blank lines.
/// Malformed lines come out as [`FailureKind::MalformedLine`] failures.
pub struct ManifestReader<R> {
    name: String,
    reader: R,
    header: ManifestHeader,
    line: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> ManifestReader<R> {
    /// Read and validate the header of the manifest called `name`.
    pub fn open(name: impl Into<String>, mut reader: R) -> Result<Self, PipelineError> {
        let name = name.into();
        let mut first = String::new();
        match reader.read_line(&mut first) {
            Ok(0) => return Err(PipelineError::corrupt(&name, "can't read first line")),
            Ok(_) => {}
            Err(e) => {
                return Err(PipelineError::corrupt(
                    &name,
                    format!("can't read first line: {e}"),
                ));
            }
        }

        let header = ManifestHeader::parse(&name, &first)?;
        Ok(Self {
            name,
            reader,
            header,
            line: 1,
            buf: Vec::new(),
            done: false,
        })
    }

    /// Manifest name as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed header.
    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    /// Algorithm named in the header.
    pub fn algorithm(&self) -> Algorithm {
        self.header.algorithm
    }

    fn malformed(&self, message: impl Into<String>) -> ItemFailure {
        ItemFailure::new(&self.name, message, FailureKind::MalformedLine).at(&self.name, self.line)
    }
}

impl<R: BufRead> Iterator for ManifestReader<R> {
    type Item = Result<ManifestEntry, ItemFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            let read = self.reader.read_until(b'\n', &mut self.buf);
            self.line += 1;

            match read {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let Ok(text) = std::str::from_utf8(&self.buf) else {
                        return Some(Err(self.malformed("malformed line; not valid UTF-8")));
                    };
                    if text.trim().is_empty() {
                        continue;
                    }
                    let parsed = parse_line(text, self.header.algorithm);
                    return Some(match parsed {
                        Ok(mut entry) => {
                            entry.line = self.line;
                            Ok(entry)
                        }
                        Err(message) => Err(self.malformed(message)),
                    });
                }
                Err(e) => {
                    self.done = true;
                    let message = format!("read error: {e}");
                    return Some(Err(self.malformed(message).with_source(e)));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sha256_hex(byte: u8) -> String {
        format!("{byte:02x}").repeat(32)
    }

    #[test]
    fn test_header_round_trip() {
        let header = ManifestHeader::new(Algorithm::Blake2b256);
        let line = header.to_string();
        assert!(line.starts_with("#!fsum blake2b-256 "));
        assert_eq!(ManifestHeader::parse("m", &line).unwrap(), header);
    }

    #[test]
    fn test_header_errors() {
        assert!(matches!(
            ManifestHeader::parse("m", "#!fsum sha256"),
            Err(PipelineError::CorruptManifest { .. })
        ));
        assert!(matches!(
            ManifestHeader::parse("m", "#!other sha256 1.0"),
            Err(PipelineError::NotAManifest { .. })
        ));
        let err = ManifestHeader::parse("sums", "#!fsum md4 1.0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "sums: possibly corrupt; unsupported hash algorithm 'md4'"
        );
    }

    #[test]
    fn test_parse_line() {
        let line = format!("{}|42|dir/file.txt", sha256_hex(0xab));
        let entry = parse_line(&line, Algorithm::Sha256).unwrap();
        assert_eq!(entry.size, 42);
        assert_eq!(entry.path, PathBuf::from("dir/file.txt"));
        assert_eq!(entry.digest.to_hex(), sha256_hex(0xab));
    }

    #[test]
    fn test_parse_line_path_keeps_pipes_after_second_delimiter() {
        let line = format!("{}|1|\"a|b\"", sha256_hex(1));
        let entry = parse_line(&line, Algorithm::Sha256).unwrap();
        assert_eq!(entry.path, PathBuf::from("a|b"));
    }

    #[test]
    fn test_parse_line_errors() {
        let hex = sha256_hex(1);
        let cases = [
            ("no delimiters".to_string(), "malformed checksum"),
            (format!("{hex}|12"), "malformed file size"),
            (format!("{hex}|twelve|f"), "malformed line; size"),
            (format!("{hex}|12|"), "malformed line; empty filename"),
            (format!("{hex}|12|\"open"), "malformed line; filename"),
            ("abcd|12|f".to_string(), "malformed checksum"),
            (format!("{}|12|f", &hex[..63]), "malformed checksum"),
        ];
        for (line, expected) in cases {
            let err = parse_line(&line, Algorithm::Sha256).unwrap_err();
            assert!(err.starts_with(expected), "{line}: {err}");
        }
    }

    #[test]
    fn test_reader_numbers_lines_and_skips_blanks() {
        let text = format!(
            "#!fsum sha256 0.1.0\n{h}|1|a\n\ngarbage\n{h}|2|b\n",
            h = sha256_hex(2)
        );
        let reader = ManifestReader::open("sums", Cursor::new(text)).unwrap();
        assert_eq!(reader.algorithm(), Algorithm::Sha256);

        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().line, 2);
        let failure = items[1].as_ref().unwrap_err();
        assert_eq!(failure.kind, FailureKind::MalformedLine);
        assert_eq!(failure.line(), Some(4));
        assert_eq!(failure.to_string(), "sums: 4: malformed checksum");
        assert_eq!(items[2].as_ref().unwrap().line, 5);
    }

    #[test]
    fn test_reader_empty_input_is_corrupt() {
        let err = ManifestReader::open("empty", Cursor::new("")).err().unwrap();
        assert_eq!(err.to_string(), "empty: possibly corrupt; can't read first line");
    }

    #[test]
    fn test_writer_output() {
        let mut writer = ManifestWriter::new(Vec::new(), Algorithm::Sha256).unwrap();
        let digest = Digest::from_hex(&sha256_hex(0xff)).unwrap();
        writer.write_entry(&digest, 3, Path::new("x|y")).unwrap();
        assert_eq!(writer.entries(), 1);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), format!("#!fsum sha256 {VERSION}"));
        assert_eq!(lines.next().unwrap(), format!("{}|3|\"x|y\"", sha256_hex(0xff)));
        assert!(lines.next().is_none());
    }
}
