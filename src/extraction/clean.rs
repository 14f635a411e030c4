//! Text cleaning applied to every extracted or pasted document.

/// Trim each line and drop the ones left empty.
pub fn remove_empty_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of spaces to one and runs of three or more newlines to two, then trim.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut spaces = 0usize;
    let mut newlines = 0usize;

    for ch in text.chars() {
        match ch {
            ' ' => {
                spaces += 1;
                newlines = 0;
                if spaces == 1 {
                    out.push(ch);
                }
            }
            '\n' => {
                newlines += 1;
                spaces = 0;
                if newlines <= 2 {
                    out.push(ch);
                }
            }
            _ => {
                spaces = 0;
                newlines = 0;
                out.push(ch);
            }
        }
    }

    out.trim().to_string()
}

/// Normalize a raw document into the plain text sent for chunking.
pub fn clean_text(text: &str) -> String {
    normalize_whitespace(&remove_empty_lines(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_empty_lines_trims_and_drops_blanks() {
        let text = "  Experience \n\n   \n\tRust engineer  \n";
        assert_eq!(remove_empty_lines(text), "Experience\nRust engineer");
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        assert_eq!(normalize_whitespace("a    b\n\n\n\nc  "), "a b\n\nc");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn clean_text_handles_windows_line_endings() {
        let text = "Skills:\r\n\r\n  Rust,   Go  \r\n";
        assert_eq!(clean_text(text), "Skills:\nRust, Go");
    }
}
