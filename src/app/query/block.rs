//! Focused query block extraction
//!
//! A query file may hold many blocks separated by blank lines. The block around
//! a cursor line is the run of non-blank lines containing it.

#![warn(clippy::all, rust_2018_idioms)]

/// Return the trimmed block surrounding zero-based `line`
pub fn focused_block(text: &str, line: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let is_blank = |index: usize| lines[index].trim().is_empty();
    let last = lines.len() - 1;
    let line = line.min(last);

    let mut start = line;
    while start != 0 && !is_blank(start) {
        start -= 1;
    }

    let mut end = line;
    while end != last && !is_blank(end) {
        end += 1;
    }

    lines[start..=end].join("\n").trim().to_string()
}

/// Split a file into all of its non-empty blocks
pub fn blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
}
