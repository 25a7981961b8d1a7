//! Delimited text output shared by the timing listeners.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Column separator for timing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_str(self) -> &'static str {
        match self {
            Delimiter::Tab => "\t",
            Delimiter::Comma => ",",
        }
    }

    /// Join cells into one line, without the trailing newline. Cells holding
    /// the delimiter, a double quote or a line break are quoted, with inner
    /// quotes doubled.
    pub fn join<S: AsRef<str>>(self, cells: &[S]) -> String {
        cells
            .iter()
            .map(|c| self.quote(c.as_ref()))
            .collect::<Vec<_>>()
            .join(self.as_str())
    }

    fn quote(self, cell: &str) -> String {
        let needs_quotes = cell.contains(self.as_str())
            || cell.contains('"')
            || cell.contains('\n')
            || cell.contains('\r');
        if needs_quotes {
            format!("\"{}\"", cell.replace('"', "\"\""))
        } else {
            cell.to_string()
        }
    }
}

/// Milliseconds with three decimals.
pub fn format_millis(duration: std::time::Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1000.0)
}

/// Write a header and rows to `path`, replacing any existing file.
pub fn write_table<S: AsRef<str>>(
    path: &Path,
    delimiter: Delimiter,
    header: &[&str],
    rows: &[Vec<S>],
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", delimiter.join(header))?;
    for row in rows {
        writeln!(writer, "{}", delimiter.join(row))?;
    }
    writer.flush()
}
