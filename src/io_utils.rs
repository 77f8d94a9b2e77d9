//! CSV reader/writer construction, delimiter resolution, and encoding.
//!
//! All file I/O flows through here. Delimiters are resolved from file
//! extensions (`.tsv` means tab) unless overridden; encodings go through
//! `encoding_rs` and default to UTF-8; the `-` path convention routes
//! through the standard streams. Readers are always constructed without
//! header handling, because header semantics belong to the evaluator, and
//! with strict field counts so ragged records surface as parse errors.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: &Path, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

/// Opens a CSV writer over a file, or stdout for `-`. Output is transcoded
/// when `encoding` is not UTF-8; quoting is minimal so untouched cells
/// round-trip byte for byte.
pub fn open_csv_writer(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = if is_dash(path) {
        Box::new(io::stdout())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating output file {path:?}"))?,
        ))
    };
    let sink: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .double_quote(true)
        .from_writer(sink))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!("failed to decode text as {}", encoding.name()))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Re-encodes a UTF-8 byte stream into `encoding` on the fly. Incomplete
/// trailing code points are held back until more bytes arrive.
struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    carry: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        TranscodingWriter {
            inner,
            encoding,
            carry: Vec::new(),
        }
    }

    fn emit(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        let text = String::from_utf8(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let (encoded, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("text not representable in {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.carry.extend_from_slice(buf);
        match std::str::from_utf8(&self.carry) {
            Ok(_) => {
                let bytes = std::mem::take(&mut self.carry);
                self.emit(bytes)?;
            }
            Err(err) if err.error_len().is_none() => {
                // Incomplete trailing sequence: flush the valid prefix and
                // hold the tail until more bytes arrive.
                let tail = self.carry.split_off(err.valid_up_to());
                let bytes = std::mem::replace(&mut self.carry, tail);
                self.emit(bytes)?;
            }
            Err(err) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.carry.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "incomplete UTF-8 sequence at end of output stream",
            ));
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn delimiters_follow_extensions() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
        assert_eq!(
            resolve_output_delimiter(Path::new("out.tsv"), None, b','),
            b'\t'
        );
        assert_eq!(resolve_output_delimiter(Path::new("out"), None, b'|'), b'|');
    }

    #[test]
    fn unknown_encoding_label_is_an_error() {
        assert!(resolve_encoding(Some("latin-1")).is_ok());
        assert!(resolve_encoding(Some("not-an-encoding")).is_err());
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
    }

    #[test]
    fn transcoding_writer_handles_split_code_points() {
        let mut out = Vec::new();
        {
            let mut writer = TranscodingWriter::new(&mut out, WINDOWS_1252);
            let bytes = "café".as_bytes();
            // Split inside the two-byte 'é' sequence.
            writer.write_all(&bytes[..4]).unwrap();
            writer.write_all(&bytes[4..]).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(out, b"caf\xe9");
    }

    #[test]
    fn reader_treats_every_row_as_data() {
        let mut reader = open_csv_reader("a,b\nc,d\n".as_bytes(), b',');
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }
}
