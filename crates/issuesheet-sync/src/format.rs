//! Cell rendering and parsing of the transient input columns.

use std::collections::HashSet;

/// Separator for label and assignee lists in a cell.
pub const LIST_SEPARATOR: &str = ", ";

/// `=HYPERLINK("url", "title")` with quotes doubled inside the literals.
pub fn hyperlink_formula(url: &str, title: &str) -> String {
    format!(
        "=HYPERLINK(\"{}\", \"{}\")",
        url.replace('"', "\"\""),
        title.replace('"', "\"\"")
    )
}

pub fn join_list(items: &[String]) -> String {
    items.join(LIST_SEPARATOR)
}

/// Split a comma-separated "send labels" cell. Entries are trimmed, empty
/// entries dropped, repeats collapsed to their first occurrence.
pub fn parse_label_input(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .filter(|label| seen.insert(label.to_string()))
        .map(str::to_string)
        .collect()
}

/// Union of the tracker's labels and the submitted ones: current labels in
/// tracker order, then new labels in submitted order.
pub fn merge_labels(current: &[String], submitted: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    current
        .iter()
        .chain(submitted)
        .filter(|label| seen.insert(*label))
        .cloned()
        .collect()
}

/// Comment text to post: an `@mention` line ahead of the body when a
/// mention is given, the body unchanged otherwise.
pub fn compose_comment(mention: &str, body: &str) -> String {
    let mention = mention.trim().trim_start_matches('@');
    if mention.is_empty() {
        body.to_string()
    } else {
        format!("@{}\n{}", mention, body)
    }
}
