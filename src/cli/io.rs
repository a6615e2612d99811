//! Output handling for CLI
//!
//! - Responses: single JSON object per line on stdout
//! - Document content: raw bytes to stdout or a file

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;

use super::errors::CliResult;

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_json(&mut io::stdout(), &response)
}

/// Write one JSON line
pub fn write_json<W: Write>(writer: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write document content to `out`, or to stdout when no path is given
pub fn write_content(out: Option<&Path>, content: &[u8]) -> CliResult<()> {
    match out {
        Some(path) => {
            fs::write(path, content)?;
        }
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(content)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
