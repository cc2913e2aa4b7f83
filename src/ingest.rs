//! CSV ingestion
//!
//! Bridges an uploaded CSV export into a [`RawTable`]. Headers are kept
//! verbatim apart from a leading byte-order mark; interpretation starts in the
//! schema normalizer. Every data record keeps its position, including blank
//! ones and ones that are not valid UTF-8, so row indices match the export.

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::RawTable;
use csv::{ByteRecord, ReaderBuilder, StringRecord, Trim};
use std::io::Read;

/// Read a CSV table from any reader
pub fn read_csv<R: Read>(reader: R) -> AnalyticsResult<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let header = String::from_utf8_lossy(h);
            if idx == 0 {
                header.trim_start_matches('\u{feff}').to_string()
            } else {
                header.into_owned()
            }
        })
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(AnalyticsError::EmptyInput);
    }

    let mut rows = Vec::new();
    let mut unreadable_rows = Vec::new();
    let mut record = ByteRecord::new();
    while rdr.read_byte_record(&mut record)? {
        match StringRecord::from_byte_record(record.clone()) {
            Ok(decoded) => rows.push(decoded.iter().map(str::to_string).collect()),
            Err(e) => {
                log::debug!("row {}: {}", rows.len(), e.utf8_error());
                unreadable_rows.push(rows.len());
                rows.push(Vec::new());
            }
        }
    }

    log::debug!(
        "ingested {} rows across {} columns ({} unreadable)",
        rows.len(),
        headers.len(),
        unreadable_rows.len()
    );
    Ok(RawTable {
        headers,
        rows,
        unreadable_rows,
    })
}

/// Read a CSV table from in-memory text
pub fn parse_csv(text: &str) -> AnalyticsResult<RawTable> {
    read_csv(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_basic() {
        let table = parse_csv("User ID,Revenue\nu1,10\nu2,20\n").unwrap();
        assert_eq!(table.headers, vec!["User ID", "Revenue"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), "20");
    }

    #[test]
    fn test_ragged_rows_are_tolerated() {
        let table = parse_csv("a,b,c\n1,2\n4,5,6,7\n").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, 2), "");
        assert_eq!(table.cell(1, 2), "6");
    }

    #[test]
    fn test_strips_bom_and_whitespace() {
        let table = parse_csv("\u{feff}User_ID , Sign Up\n u1 , 2024-01-01 \n").unwrap();
        assert_eq!(table.headers, vec!["User_ID", "Sign Up"]);
        assert_eq!(table.cell(0, 0), "u1");
        assert_eq!(table.cell(0, 1), "2024-01-01");
    }

    #[test]
    fn test_blank_records_keep_their_position() {
        let table = parse_csv("a,b\n1,2\n,\n3,4\n").unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.cell(1, 0), "");
        assert_eq!(table.cell(2, 0), "3");
    }

    #[test]
    fn test_invalid_utf8_row_is_isolated() {
        let bytes: &[u8] = b"User_ID,Sign_Up,Last_Login,Revenue\n\
            A,2024-01-01,2024-01-02,1\n\
            B\xff,2024-01-01,2024-01-02,1\n\
            C,2024-01-03,2024-01-04,2\n";
        let table = read_csv(bytes).unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.unreadable_rows, vec![1]);
        assert!(table.is_unreadable(1));
        assert_eq!(table.cell(0, 0), "A");
        assert_eq!(table.cell(1, 0), "");
        assert_eq!(table.cell(2, 0), "C");
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_csv(""), Err(AnalyticsError::EmptyInput)));
    }
}
