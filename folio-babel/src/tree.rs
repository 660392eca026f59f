//! Normalized document tree: sections, blocks and assets.
//!
//! This is the structure persistence and rendering consume. Block content is a
//! LaTeX-flavoured markup string (see [`crate::markup`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub sections: Vec<Section>,
}

impl Document {
    /// Depth-first iterator over every section.
    pub fn walk_sections(&self) -> Vec<&Section> {
        fn visit<'a>(section: &'a Section, out: &mut Vec<&'a Section>) {
            out.push(section);
            for child in &section.children {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        for section in &self.sections {
            visit(section, &mut out);
        }
        out
    }

    pub fn section_count(&self) -> usize {
        self.walk_sections().len()
    }

    pub fn block_count(&self) -> usize {
        self.walk_sections().iter().map(|s| s.blocks.len()).sum()
    }

    /// Blocks of every section in document order.
    pub fn blocks(&self) -> Vec<&Block> {
        self.walk_sections()
            .into_iter()
            .flat_map(|s| s.blocks.iter())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    pub title: String,
    /// Heading level that opened the section; 0 for the implicit default section.
    pub level: u8,
    pub sort_order: usize,
    pub blocks: Vec<Block>,
    pub children: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Paragraph,
    Equation,
    Code,
    Table,
    Figure,
    ListItem,
    Abstract,
    Blockquote,
    Theorem,
    Bibliography,
    PageBreak,
    Header,
    Footer,
    Footnote,
    Endnote,
    Comment,
    TrackChange,
    TableOfContents,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Equation => "equation",
            BlockType::Code => "code",
            BlockType::Table => "table",
            BlockType::Figure => "figure",
            BlockType::ListItem => "list_item",
            BlockType::Abstract => "abstract",
            BlockType::Blockquote => "blockquote",
            BlockType::Theorem => "theorem",
            BlockType::Bibliography => "bibliography",
            BlockType::PageBreak => "page_break",
            BlockType::Header => "header",
            BlockType::Footer => "footer",
            BlockType::Footnote => "footnote",
            BlockType::Endnote => "endnote",
            BlockType::Comment => "comment",
            BlockType::TrackChange => "track_change",
            BlockType::TableOfContents => "table_of_contents",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: String,
    pub sort_order: usize,
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Structured facts the markup does not carry (list level, author, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Block {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub filename: String,
    pub mime_type: String,
    #[serde(with = "crate::ir::elements::base64_bytes")]
    pub bytes: Vec<u8>,
    /// Lowercase hex sha256 of `bytes`.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Sequential id counters scoped to one conversion run.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    section: u64,
    block: u64,
    asset: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_section(&mut self) -> u64 {
        self.section += 1;
        self.section
    }

    pub fn next_block(&mut self) -> u64 {
        self.block += 1;
        self.block
    }

    pub fn next_asset(&mut self) -> u64 {
        self.asset += 1;
        self.asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: u64, children: Vec<Section>, blocks: usize) -> Section {
        Section {
            id,
            parent_id: None,
            title: format!("s{id}"),
            level: 1,
            sort_order: 0,
            blocks: (0..blocks)
                .map(|i| Block {
                    id: id * 10 + i as u64,
                    block_type: BlockType::Paragraph,
                    content: String::new(),
                    sort_order: i,
                    assets: vec![],
                    attributes: BTreeMap::new(),
                })
                .collect(),
            children,
        }
    }

    #[test]
    fn walk_is_depth_first() {
        let doc = Document {
            title: "t".into(),
            sections: vec![
                section(1, vec![section(2, vec![], 1), section(3, vec![], 2)], 1),
                section(4, vec![], 0),
            ],
        };
        let ids: Vec<u64> = doc.walk_sections().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(doc.block_count(), 4);
    }

    #[test]
    fn allocator_counters_are_independent() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_section(), 1);
        assert_eq!(ids.next_block(), 1);
        assert_eq!(ids.next_block(), 2);
        assert_eq!(ids.next_section(), 2);
        assert_eq!(ids.next_asset(), 1);
    }
}
