//! Flat tabular artifact format: writer and parser.
//!
//! The published format is deliberately narrow: a header row of double-quoted
//! column names, then one record per line where integer fields are written
//! bare and every other field is double-quoted with embedded `"` doubled.
//! The parser reads the same dialect back (it is what a later run uses to
//! decode the remote `file_hashes.csv`).

use thiserror::Error;

/// One output cell: integers go unquoted, everything else is quoted.
#[derive(Debug, Clone, Copy)]
pub enum CsvValue<'a> {
    Integer(u64),
    Text(&'a str),
}

/// Incremental writer for one artifact body.
#[derive(Debug)]
pub struct CsvWriter {
    buf: String,
}

impl CsvWriter {
    pub fn with_header(columns: &[&str]) -> Self {
        let mut writer = Self { buf: String::new() };
        for (index, column) in columns.iter().enumerate() {
            if index > 0 {
                writer.buf.push(',');
            }
            push_quoted(&mut writer.buf, column);
        }
        writer.buf.push('\n');
        writer
    }

    pub fn record(&mut self, values: &[CsvValue<'_>]) {
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                self.buf.push(',');
            }
            match value {
                CsvValue::Integer(n) => {
                    self.buf.push_str(&n.to_string());
                }
                CsvValue::Text(text) => push_quoted(&mut self.buf, text),
            }
        }
        self.buf.push('\n');
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

fn push_quoted(buf: &mut String, value: &str) {
    buf.push('"');
    for c in value.chars() {
        if c == '"' {
            buf.push('"');
        }
        buf.push(c);
    }
    buf.push('"');
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsvParseError {
    #[error("unterminated quoted field in record {record}")]
    UnterminatedQuote { record: usize },
}

/// Parse a document in the artifact dialect into records of string fields.
///
/// Quoted fields may contain commas, doubled quotes, and newlines; unquoted
/// fields run to the next comma or line break. Blank lines are skipped.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>, CsvParseError> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_record = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_record = true;
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                field.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(other) => field.push(other),
                        None => {
                            return Err(CsvParseError::UnterminatedQuote {
                                record: records.len() + 1,
                            });
                        }
                    }
                }
            }
            ',' => {
                in_record = true;
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    field.push('\r');
                    in_record = true;
                }
            }
            '\n' => {
                if in_record || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                in_record = false;
            }
            other => {
                in_record = true;
                field.push(other);
            }
        }
    }

    if in_record || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_columns_are_quoted_and_integers_are_not() {
        let mut writer = CsvWriter::with_header(&["period", "total_post_count"]);
        writer.record(&[CsvValue::Text("2024-03"), CsvValue::Integer(41)]);
        assert_eq!(
            writer.finish(),
            "\"period\",\"total_post_count\"\n\"2024-03\",41\n"
        );
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let mut writer = CsvWriter::with_header(&["username"]);
        writer.record(&[CsvValue::Text(r#"the "one""#)]);
        assert_eq!(writer.finish(), "\"username\"\n\"the \"\"one\"\"\"\n");
    }

    #[test]
    fn writer_output_parses_back_identically() {
        let mut writer = CsvWriter::with_header(&["a", "b", "c"]);
        writer.record(&[
            CsvValue::Text("plain"),
            CsvValue::Integer(0),
            CsvValue::Text("with, comma and \"quotes\""),
        ]);
        let text = writer.finish();

        let rows = parse(&text).expect("parses");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["plain", "0", "with, comma and \"quotes\""]);
    }

    #[test]
    fn quoted_fields_may_contain_newlines() {
        let rows = parse("\"line\none\",\"x\"\n\"next\",\"y\"\n").expect("parses");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "line\none");
        assert_eq!(rows[1][0], "next");
    }

    #[test]
    fn blank_lines_and_crlf_are_tolerated() {
        let rows = parse("\"a\"\r\n\r\n\"b\"\n").expect("parses");
        assert_eq!(rows, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            parse("\"a\"\n\"broken"),
            Err(CsvParseError::UnterminatedQuote { record: 2 })
        );
    }

    #[test]
    fn header_only_document_has_one_record() {
        let writer = CsvWriter::with_header(&["user_id", "total_post_count"]);
        let rows = parse(&writer.finish()).expect("parses");
        assert_eq!(rows.len(), 1);
    }
}
