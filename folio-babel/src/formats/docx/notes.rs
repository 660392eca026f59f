//! Footnote, endnote and comment parts.

use super::xml::{self, w_attr};
use std::collections::HashMap;

/// Note bodies by id. `tag` is `footnote` or `endnote`; separator notes are
/// skipped.
pub fn parse_notes(source: &str, tag: &str) -> Result<HashMap<String, String>, String> {
    let doc = xml::parse(source).map_err(|e| e.to_string())?;
    let notes = doc
        .root_element()
        .children()
        .filter(|n| xml::is_w(*n, tag))
        .filter(|n| {
            !matches!(
                w_attr(*n, "type"),
                Some("separator" | "continuationSeparator" | "continuationNotice")
            )
        })
        .filter_map(|n| {
            let id = w_attr(n, "id")?.to_string();
            Some((id, xml::block_text(n)))
        })
        .collect();
    Ok(notes)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommentBody {
    pub author: Option<String>,
    pub date: Option<String>,
    pub text: String,
}

pub fn parse_comments(source: &str) -> Result<HashMap<String, CommentBody>, String> {
    let doc = xml::parse(source).map_err(|e| e.to_string())?;
    let comments = doc
        .root_element()
        .children()
        .filter(|n| xml::is_w(*n, "comment"))
        .filter_map(|n| {
            let id = w_attr(n, "id")?.to_string();
            Some((
                id,
                CommentBody {
                    author: w_attr(n, "author").map(str::to_string),
                    date: w_attr(n, "date").map(str::to_string),
                    text: xml::block_text(n),
                },
            ))
        })
        .collect();
    Ok(comments)
}
