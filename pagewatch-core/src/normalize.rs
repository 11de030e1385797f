/// Canonical form of extracted text, used only as fingerprint input.
///
/// Lowercases, drops ASCII punctuation, collapses every whitespace run inside
/// a line to one space and trims each line. Line breaks are kept; blank lines
/// at the very start and end are dropped.
///
/// Punctuation goes before whitespace is collapsed so that `"a - b"` becomes
/// `"a b"` in one pass and the function is idempotent.
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    let lines: Vec<String> = stripped
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());

    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}
