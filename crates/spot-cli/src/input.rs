//! Reading series from files

use crate::error::{CliError, CliResult};
use std::path::Path;

/// Parse readings separated by whitespace or commas. `#` starts a comment.
pub fn parse_series(text: &str, origin: &str) -> CliResult<Vec<f64>> {
    let mut values = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token.parse().map_err(|_| CliError::Input {
                path: origin.to_string(),
                reason: format!("line {}: '{}' is not a number", line_no + 1, token),
            })?;
            values.push(value);
        }
    }
    Ok(values)
}

/// Read a series file; `-` reads stdin.
pub fn read_series(path: &Path) -> CliResult<Vec<f64>> {
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path).map_err(|e| CliError::Input {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
    };
    parse_series(&text, &path.display().to_string())
}
