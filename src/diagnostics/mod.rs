//! Human-readable rendering of parse/evaluation errors, for the CLI.

use crate::Error;

/// Renders `err` against `source` with a caret under the offending offset,
/// mirroring what a terminal compiler diagnostic looks like.
pub fn render(source: &str, err: &Error) -> String {
    match err {
        Error::Parse(e) => caret(source, e.offset, &e.to_string()),
        Error::Eval(e) => match e.offset {
            Some(offset) => caret(source, offset, &e.to_string()),
            None => e.to_string(),
        },
        Error::InvalidJson(msg) => format!("invalid JSON input: {msg}"),
    }
}

fn caret(source: &str, offset: usize, message: &str) -> String {
    let offset = offset.min(source.len());
    let line_start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[offset..].find('\n').map(|i| offset + i).unwrap_or(source.len());
    let line = &source[line_start..line_end];
    let column = offset - line_start;
    format!("{message}\n{line}\n{}^", " ".repeat(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_at_the_offending_column() {
        let source = "Patient.(";
        let err = crate::compile(source).unwrap_err();
        let rendered = caret(source, err.offset, &err.to_string());
        assert!(rendered.contains("Patient.("));
    }
}
