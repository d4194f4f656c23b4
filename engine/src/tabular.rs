//! Delimited-text parser for trace exports.
//!
//! Produces one header-keyed row per data line with cells coerced through
//! [`CellValue::coerce`]. The header row and the synthetic trailing empty
//! row are excluded from the output.

use indexmap::IndexMap;
use shared::{CellValue, Row};

use crate::error::FormatError;

struct Parser {
    chars: Vec<char>,
    index: usize,
    rows: Vec<Vec<CellValue>>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Parser {
            chars: text.replace('\r', "").chars().collect(),
            index: 0,
            rows: vec![Vec::new()],
        }
    }

    /// Consume a double-quoted cell. A doubled `""` is a literal quote.
    /// An unterminated quote at end-of-input is treated as implicitly
    /// closed; intentional leniency, kept from the format's producers.
    fn parse_quoted(&mut self) -> String {
        let mut cell = String::new();
        self.index += 1;
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            if c == '"' {
                if self.chars.get(self.index + 1) == Some(&'"') {
                    cell.push('"');
                    self.index += 2;
                } else {
                    self.index += 1;
                    break;
                }
            } else {
                cell.push(c);
                self.index += 1;
            }
        }
        cell
    }

    fn parse_unquoted(&mut self) -> String {
        let mut cell = String::new();
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            if c == ',' || c == '\n' {
                break;
            }
            cell.push(c);
            self.index += 1;
        }
        cell
    }

    fn parse(mut self) -> Result<Vec<Row>, FormatError> {
        while self.index < self.chars.len() {
            let cell = if self.chars[self.index] == '"' {
                self.parse_quoted()
            } else {
                self.parse_unquoted()
            };
            let last = self.rows.len() - 1;
            self.rows[last].push(CellValue::coerce(&cell));

            if self.index >= self.chars.len() {
                break;
            }

            if self.chars[self.index] == '\n' {
                let last = self.rows.len() - 1;
                if self.rows[0].len() != self.rows[last].len() {
                    return Err(FormatError::ColumnCount {
                        row: last,
                        count: self.rows[last].len(),
                    });
                }
                self.rows.push(Vec::new());
            }
            self.index += 1;
        }

        if self.rows.len() < 2 {
            return Ok(Vec::new());
        }

        let headers: Vec<String> = self.rows[0]
            .iter()
            .map(CellValue::to_display_string)
            .collect();

        // Skip the header and the synthetic trailing row.
        let data_rows = &self.rows[1..self.rows.len() - 1];
        Ok(data_rows
            .iter()
            .map(|cells| {
                headers
                    .iter()
                    .cloned()
                    .zip(cells.iter().cloned())
                    .collect::<IndexMap<_, _>>()
            })
            .collect())
    }
}

/// Parse delimited text (CRLF tolerated) into header-keyed rows.
pub fn parse_tabular(text: &str) -> Result<Vec<Row>, FormatError> {
    Parser::new(text).parse()
}

/// Quote a field for the tabular format, doubling embedded quotes.
pub fn escape_field(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_cell<'a>(row: &'a Row, key: &str) -> &'a str {
        row[key].as_text().unwrap()
    }

    #[test]
    fn test_basic_table_shape() {
        let rows = parse_tabular("a,b,c\n1,2,x\n4,5,y\n").unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.len(), 3);
        }
        assert_eq!(rows[0]["a"], CellValue::Number(1.0));
        assert_eq!(rows[1]["c"], CellValue::Text("y".to_string()));
    }

    #[test]
    fn test_crlf_normalized() {
        let rows = parse_tabular("a,b\r\n1,2\r\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["b"], CellValue::Number(2.0));
    }

    #[test]
    fn test_quoted_cells_and_escapes() {
        let rows = parse_tabular("a,b\n\"hello, world\",\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(text_cell(&rows[0], "a"), "hello, world");
        assert_eq!(text_cell(&rows[0], "b"), "say \"hi\"");
    }

    #[test]
    fn test_quoted_numbers_coerce() {
        let rows = parse_tabular("n,s\n\"12\",\"12a\"\n").unwrap();
        assert_eq!(rows[0]["n"], CellValue::Number(12.0));
        assert_eq!(rows[0]["s"], CellValue::Text("12a".to_string()));
    }

    #[test]
    fn test_column_count_mismatch_names_row() {
        let err = parse_tabular("a,b,c\n1,2,3\n4,5\n").unwrap_err();
        match err {
            FormatError::ColumnCount { row, count } => {
                assert_eq!(row, 2);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unterminated_quote_implicitly_closed() {
        // The open quote consumes to end-of-input, so this is not a hard
        // error; the unterminated row is the trailing row and is excluded.
        let rows = parse_tabular("a\n1\n\"unclosed\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["a"], CellValue::Number(1.0));
    }

    #[test]
    fn test_escape_round_trip() {
        let originals = [
            "plain",
            "with, comma",
            "with \"quotes\" inside",
            "trailing\"",
            "",
        ];
        let header = "v";
        let mut table = format!("{header}\n");
        for cell in originals {
            table.push_str(&escape_field(cell));
            table.push('\n');
        }
        let rows = parse_tabular(&table).unwrap();
        assert_eq!(rows.len(), originals.len());
        for (row, original) in rows.iter().zip(originals) {
            assert_eq!(text_cell(row, header), original);
        }
    }

    #[test]
    fn test_header_only_input() {
        let rows = parse_tabular("a,b,c\n").unwrap();
        assert!(rows.is_empty());
    }
}
