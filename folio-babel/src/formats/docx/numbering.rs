//! List definitions (`word/numbering.xml`).

use super::xml::{self, w_attr, w_child, w_val};
use std::collections::HashMap;

/// `numId` → `abstractNumId` → per-level `numFmt`.
#[derive(Debug, Clone, Default)]
pub struct Numbering {
    nums: HashMap<String, String>,
    formats: HashMap<String, HashMap<u8, String>>,
    overrides: HashMap<(String, u8), String>,
}

impl Numbering {
    pub fn parse(source: &str) -> Result<Self, String> {
        let doc = xml::parse(source).map_err(|e| e.to_string())?;
        let root = doc.root_element();
        let mut numbering = Numbering::default();

        for node in root.children().filter(|n| xml::is_w(*n, "abstractNum")) {
            let Some(id) = w_attr(node, "abstractNumId") else {
                continue;
            };
            let levels = node
                .children()
                .filter(|n| xml::is_w(*n, "lvl"))
                .filter_map(|lvl| {
                    let ilvl = w_attr(lvl, "ilvl")?.parse().ok()?;
                    let format = w_val(lvl, "numFmt").unwrap_or("decimal");
                    Some((ilvl, format.to_string()))
                })
                .collect();
            numbering.formats.insert(id.to_string(), levels);
        }

        for node in root.children().filter(|n| xml::is_w(*n, "num")) {
            let Some(num_id) = w_attr(node, "numId") else {
                continue;
            };
            if let Some(abstract_id) = w_val(node, "abstractNumId") {
                numbering
                    .nums
                    .insert(num_id.to_string(), abstract_id.to_string());
            }
            for over in node.children().filter(|n| xml::is_w(*n, "lvlOverride")) {
                let Some(ilvl) = w_attr(over, "ilvl").and_then(|v| v.parse().ok()) else {
                    continue;
                };
                if let Some(format) = w_child(over, "lvl").and_then(|l| w_val(l, "numFmt")) {
                    numbering
                        .overrides
                        .insert((num_id.to_string(), ilvl), format.to_string());
                }
            }
        }
        Ok(numbering)
    }

    /// `numFmt` for a list level, if the definitions exist.
    pub fn format(&self, num_id: &str, ilvl: u8) -> Option<&str> {
        if let Some(format) = self.overrides.get(&(num_id.to_string(), ilvl)) {
            return Some(format);
        }
        let abstract_id = self.nums.get(num_id)?;
        self.formats.get(abstract_id)?.get(&ilvl).map(String::as_str)
    }

    /// Anything but `bullet` counts as ordered.
    pub fn is_ordered(&self, num_id: &str, ilvl: u8) -> Option<bool> {
        self.format(num_id, ilvl).map(|format| format != "bullet")
    }
}
