//! Builds the section forest from a flat run of headings and blocks.
//!
//! # The Algorithm
//!
//! Flat formats carry no explicit section ends: a heading simply starts a new
//! section and implicitly closes every open section at the same or a deeper
//! level. The builder keeps a level stack (`level → section`) of the sections
//! that are still open:
//!
//! 1. On a heading at level `L`, the parent is the nearest open section found
//!    by scanning levels `L-1` down to `1`. No parent means a new root.
//! 2. Every entry with level `≥ L` is dropped from the stack and the new
//!    section is inserted at `L`. It becomes the current section.
//! 3. Blocks always land in the current section.
//!
//! Content that arrives before the first heading goes into an implicit
//! level-0 section, created on first use. It never enters the level stack, so
//! headings after it become roots.
//!
//! Sections are built in a flat arena and only nested into owned
//! [`Section`] values by [`SectionBuilder::finish`].

use crate::tree::{Block, Section};
use std::collections::BTreeMap;

#[derive(Debug)]
struct Draft {
    id: u64,
    parent: Option<usize>,
    title: String,
    level: u8,
    blocks: Vec<Block>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct SectionBuilder {
    arena: Vec<Draft>,
    roots: Vec<usize>,
    level_stack: BTreeMap<u8, usize>,
    current: Option<usize>,
    default_section: Option<usize>,
}

impl SectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a section for a heading at `level` (clamped to at least 1).
    pub fn open(&mut self, id: u64, title: impl Into<String>, level: u8) {
        let level = level.max(1);
        let parent = (1..level)
            .rev()
            .find_map(|l| self.level_stack.get(&l).copied());

        let index = self.push_draft(id, parent, title.into(), level);

        // Close everything at this level or deeper.
        let _closed = self.level_stack.split_off(&level);
        self.level_stack.insert(level, index);
        self.current = Some(index);
    }

    /// Open the implicit level-0 section that holds content before the first
    /// heading.
    pub fn open_default(&mut self, id: u64, title: impl Into<String>) {
        let index = self.push_draft(id, None, title.into(), 0);
        self.default_section = Some(index);
        self.current = Some(index);
    }

    fn push_draft(&mut self, id: u64, parent: Option<usize>, title: String, level: u8) -> usize {
        let index = self.arena.len();
        self.arena.push(Draft {
            id,
            parent,
            title,
            level,
            blocks: Vec::new(),
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.arena[p].children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Append a block to the current section. Returns false when no section
    /// is open yet.
    pub fn push_block(&mut self, mut block: Block) -> bool {
        let Some(index) = self.current else {
            return false;
        };
        let section = &mut self.arena[index];
        block.sort_order = section.blocks.len();
        section.blocks.push(block);
        true
    }

    /// Sections opened by headings; the implicit section is not counted.
    pub fn heading_sections(&self) -> usize {
        self.arena.len() - usize::from(self.default_section.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Levels currently open in the stack, ascending.
    pub fn open_levels(&self) -> Vec<u8> {
        self.level_stack.keys().copied().collect()
    }

    /// Nest the arena into owned sections. The implicit section is dropped if
    /// it stayed empty and other sections exist.
    pub fn finish(mut self) -> Vec<Section> {
        if let Some(index) = self.default_section {
            let empty = self.arena[index].blocks.is_empty();
            if empty && self.arena.len() > 1 {
                self.roots.retain(|r| *r != index);
            }
        }

        let mut slots: Vec<Option<Draft>> = self.arena.into_iter().map(Some).collect();
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(order, &index)| build(&mut slots, index, None, order))
            .collect()
    }
}

fn build(
    slots: &mut [Option<Draft>],
    index: usize,
    parent_id: Option<u64>,
    sort_order: usize,
) -> Option<Section> {
    let draft = slots.get_mut(index)?.take()?;
    debug_assert!(draft.parent.is_none() == parent_id.is_none());
    let children = draft
        .children
        .iter()
        .enumerate()
        .filter_map(|(order, &child)| build(slots, child, Some(draft.id), order))
        .collect();
    Some(Section {
        id: draft.id,
        parent_id,
        title: draft.title,
        level: draft.level,
        sort_order,
        blocks: draft.blocks,
        children,
    })
}

/// Nesting depth of a forest: 1 for a flat list of roots, 0 when empty.
pub fn forest_depth(sections: &[Section]) -> usize {
    sections
        .iter()
        .map(|s| 1 + forest_depth(&s.children))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::BlockType;
    use proptest::prelude::*;

    fn block(id: u64) -> Block {
        Block {
            id,
            block_type: BlockType::Paragraph,
            content: format!("p{id}"),
            sort_order: 0,
            assets: vec![],
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn headings_nest_by_level() {
        let mut builder = SectionBuilder::new();
        builder.open(1, "Intro", 1);
        builder.open(2, "Background", 2);
        builder.push_block(block(1));
        builder.open(3, "Methods", 1);
        builder.open(4, "Deep", 3);

        let sections = builder.finish();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].children[0].title, "Background");
        assert_eq!(sections[0].children[0].parent_id, Some(1));
        assert_eq!(sections[0].children[0].blocks.len(), 1);
        // A level-3 heading directly under level 1 attaches to the level-1 section.
        assert_eq!(sections[1].children[0].title, "Deep");
        assert_eq!(sections[1].children[0].parent_id, Some(3));
        assert_eq!(sections[1].sort_order, 1);
    }

    #[test]
    fn headings_after_the_default_section_are_roots() {
        let mut builder = SectionBuilder::new();
        builder.open_default(1, "Untitled Section");
        builder.push_block(block(1));
        builder.open(2, "Chapter", 2);

        let sections = builder.finish();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[1].parent_id, None);
    }

    #[test]
    fn empty_default_section_is_dropped() {
        let mut builder = SectionBuilder::new();
        builder.open_default(1, "Untitled Section");
        builder.open(2, "Real", 1);
        assert_eq!(builder.heading_sections(), 1);

        let sections = builder.finish();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Real");
        assert_eq!(sections[0].sort_order, 0);
    }

    #[test]
    fn lone_empty_default_section_is_kept() {
        let mut builder = SectionBuilder::new();
        builder.open_default(1, "Untitled Section");
        assert_eq!(builder.finish().len(), 1);
    }

    #[test]
    fn block_sort_order_is_position_in_section() {
        let mut builder = SectionBuilder::new();
        assert!(!builder.push_block(block(1)));
        builder.open(1, "A", 1);
        builder.push_block(block(1));
        builder.push_block(block(2));
        let sections = builder.finish();
        let orders: Vec<usize> = sections[0].blocks.iter().map(|b| b.sort_order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    proptest! {
        #[test]
        fn a_heading_closes_every_section_at_its_level_or_deeper(levels in prop::collection::vec(1u8..7, 1..40)) {
            let mut builder = SectionBuilder::new();
            for (i, level) in levels.iter().enumerate() {
                builder.open(i as u64 + 1, format!("h{i}"), *level);
                let open = builder.open_levels();
                prop_assert_eq!(open.iter().filter(|l| **l >= *level).count(), 1);
                prop_assert_eq!(open.last().copied(), Some(*level));
            }
            let sections = builder.finish();
            let count: usize = sections.iter().map(count_sections).sum();
            prop_assert_eq!(count, levels.len());
        }
    }

    fn count_sections(section: &Section) -> usize {
        1 + section.children.iter().map(count_sections).sum::<usize>()
    }

    #[test]
    fn depth_of_forest() {
        let mut builder = SectionBuilder::new();
        builder.open(1, "a", 1);
        builder.open(2, "b", 2);
        builder.open(3, "c", 3);
        builder.open(4, "d", 1);
        assert_eq!(forest_depth(&builder.finish()), 3);
    }
}
