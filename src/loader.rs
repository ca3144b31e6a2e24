use crate::error::{delimiter_name, Attempt, LoadError};
use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Encodings tried in order. Strict UTF-8 comes first because windows-1252
/// maps every byte and would mangle a UTF-8 file. Since windows-1252 never
/// fails, it is the last encoding worth trying; it also covers latin-1 text.
pub const ENCODINGS: [&Encoding; 2] = [UTF_8, WINDOWS_1252];

/// Field delimiters tried, per encoding, in order.
pub const DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

/// A source table as parsed, before any cleaning. Every row has exactly one
/// cell per header.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub encoding: &'static str,
    pub delimiter: u8,
}

impl RawTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

/// Read a delimited file, trying every encoding and delimiter until one
/// yields more than one column.
pub fn load_raw(path: &Path) -> Result<RawTable, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_bytes(&bytes).map_err(|attempts| LoadError::Unreadable {
        path: path.to_path_buf(),
        attempts,
    })?;
    info!(
        path = %path.display(),
        encoding = table.encoding,
        delimiter = %delimiter_name(table.delimiter),
        columns = table.width(),
        rows = table.rows.len(),
        "loaded source table"
    );
    Ok(table)
}

/// Same as [`load_raw`] for bytes already in memory. On failure, returns
/// every rejected attempt.
pub fn parse_bytes(bytes: &[u8]) -> Result<RawTable, Vec<Attempt>> {
    let mut attempts = Vec::new();
    for encoding in ENCODINGS {
        let text = match decode(encoding, bytes) {
            Some(text) => text,
            None => {
                for delimiter in DELIMITERS {
                    let attempt = Attempt {
                        encoding: encoding.name(),
                        delimiter,
                        reason: format!("invalid byte sequence for {}", encoding.name()),
                    };
                    debug!(%attempt, "loader attempt rejected");
                    attempts.push(attempt);
                }
                continue;
            }
        };
        for delimiter in DELIMITERS {
            match parse_text(&text, delimiter) {
                Ok((headers, rows)) => {
                    return Ok(RawTable {
                        headers,
                        rows,
                        encoding: encoding.name(),
                        delimiter,
                    })
                }
                Err(reason) => {
                    let attempt = Attempt {
                        encoding: encoding.name(),
                        delimiter,
                        reason,
                    };
                    debug!(%attempt, "loader attempt rejected");
                    attempts.push(attempt);
                }
            }
        }
    }
    Err(attempts)
}

fn decode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
    } else {
        bytes
    };
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}

fn parse_text(text: &str, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.len() <= 1 {
        return Err(format!("only {} column(s) in header", headers.len()));
    }

    let width = headers.len();
    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        // Header is line 1.
        let record = result.map_err(|e| format!("line {}: {}", idx + 2, e))?;
        let mut cells: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        cells.resize(width, String::new());
        rows.push(cells);
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_utf8() {
        let table = parse_bytes("Région;Total\nBretagne;12\n".as_bytes()).unwrap();
        assert_eq!(table.encoding, "UTF-8");
        assert_eq!(table.delimiter, b';');
        assert_eq!(table.headers, vec!["Région", "Total"]);
        assert_eq!(table.cell(0, 0), Some("Bretagne"));
    }

    #[test]
    fn falls_back_to_windows_1252() {
        // "Région" in latin-1: é = 0xE9
        let bytes = b"R\xE9gion;Total\nBretagne;12\n";
        let table = parse_bytes(bytes).unwrap();
        assert_eq!(table.encoding, "windows-1252");
        assert_eq!(table.headers[0], "Région");
    }

    #[test]
    fn windows_1252_keeps_oe_ligature_and_euro_sign() {
        // Œ = 0x8C, € = 0x80
        let table = parse_bytes(b"Libell\xE9;Montant\n\x8Cuvre;10 \x80\n").unwrap();
        assert_eq!(table.encoding, "windows-1252");
        assert_eq!(table.cell(0, 0), Some("Œuvre"));
        assert_eq!(table.cell(0, 1), Some("10 €"));
    }

    #[test]
    fn falls_back_to_comma_when_semicolon_gives_one_column() {
        let table = parse_bytes(b"Region,Total\nBretagne,12\n").unwrap();
        assert_eq!(table.delimiter, b',');
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn strips_utf8_bom() {
        let table = parse_bytes(b"\xEF\xBB\xBFRegion;Total\nA;1\n").unwrap();
        assert_eq!(table.headers[0], "Region");
    }

    #[test]
    fn pads_short_rows_and_truncates_long_ones() {
        let table = parse_bytes(b"A;B;C\n1\n1;2;3;4\n").unwrap();
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn single_column_file_is_rejected_with_every_attempt() {
        let attempts = parse_bytes(b"just one column\nvalue\n").unwrap_err();
        assert_eq!(attempts.len(), ENCODINGS.len() * DELIMITERS.len());
        assert!(attempts.iter().all(|a| a.reason.contains("column")));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_raw(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
