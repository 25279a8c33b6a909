//! CSV export of extracted rows.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use cardiff_xbrl::{Row, SCHEMA};
use csv::{QuoteStyle, WriterBuilder};
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Streaming CSV writer for accounts rows.
///
/// Writes the schema header on construction and one record per row, with
/// the source archive URL in the trailing `zip_url` column. Quoting is
/// "quote non-numerics": numeric fields stay bare so they round-trip as
/// numbers in downstream tools.
#[derive(Debug)]
pub struct RowWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl RowWriter<File> {
    /// Create a writer over a new file at `path`.
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> RowWriter<W> {
    /// Wrap an output stream and write the header record.
    pub fn new(output: W) -> Result<Self, ExportError> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::NonNumeric)
            .from_writer(output);
        writer.write_record(SCHEMA.iter())?;
        Ok(Self { writer })
    }

    /// Append one extracted row.
    pub fn write_row(&mut self, row: &Row, zip_url: &str) -> Result<(), ExportError> {
        self.writer.write_record(row.fields(zip_url))?;
        Ok(())
    }

    /// Flush buffered records to the underlying stream.
    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Serialise rows to a CSV string, mainly for tests and small exports.
pub fn rows_to_string(rows: &[Row], zip_url: &str) -> Result<String, ExportError> {
    let mut writer = RowWriter::new(Vec::new())?;
    for row in rows {
        writer.write_row(row, zip_url)?;
    }
    writer.flush()?;
    let bytes = writer.writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes).expect("CSV output is UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardiff_xbrl::document_to_rows;

    fn sample_rows() -> Vec<Row> {
        let xml = r#"<xbrl>
          <context id="c1"><period><instant>2022-12-31</instant></period></context>
          <CurrentAssets contextRef="c1">259832</CurrentAssets>
          <EntityCurrentLegalName>ACME LIMITED</EntityCurrentLegalName>
        </xbrl>"#;
        document_to_rows("Prod223_2542_09355500_20230302.xml", xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_header_is_the_schema() {
        let csv = rows_to_string(&[], "http://example.test/a.zip").unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("\"run_code\",\"company_id\",\"date\""));
        assert!(header.ends_with("\"error\",\"zip_url\""));
        assert_eq!(header.split(',').count(), SCHEMA.len());
    }

    #[test]
    fn test_numbers_unquoted_strings_quoted() {
        let rows = sample_rows();
        let csv = rows_to_string(&rows, "http://example.test/a.zip").unwrap();
        let record = csv.lines().nth(1).unwrap();
        assert!(record.contains(",259832,"));
        assert!(record.contains("\"ACME LIMITED\""));
        assert!(record.contains("\"2023-03-02\""));
        assert!(record.contains("\"http://example.test/a.zip\""));
    }

    #[test]
    fn test_record_width_matches_header() {
        let rows = sample_rows();
        let csv = rows_to_string(&rows, "http://example.test/a.zip").unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        for record in reader.records() {
            assert_eq!(record.unwrap().len(), SCHEMA.len());
        }
    }

    #[test]
    fn test_write_to_file() {
        let rows = sample_rows();
        let path = std::env::temp_dir().join("cardiff_export_test.csv");
        let mut writer = RowWriter::create(&path).unwrap();
        for row in &rows {
            writer.write_row(row, "http://example.test/a.zip").unwrap();
        }
        writer.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("259832"));
        std::fs::remove_file(path).ok();
    }
}
