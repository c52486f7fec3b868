//! The lazily materialized tree of units and DIEs.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A DIE with
//! children is first displayed with a single placeholder child; the real
//! children replace it on the first expansion request. The placeholder's
//! slot is reused for the first real child, so handles already given out
//! never move.

use crate::config::Options;
use crate::reader::{DieId, DwarfReader, UnitSpace};
use crate::{symbols, typename};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Children not fetched yet; exactly one placeholder child is present
    Unexpanded,
    /// Children are being fetched
    Expanding,
    /// Children, possibly none, are materialized
    Expanded,
}

/// The display columns of a DIE node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// Lowercase hex, no prefix
    pub offset: String,
    pub tag: String,
    pub name: Option<String>,
}

impl Row {
    fn new(reader: &dyn DwarfReader, die: DieId, name: Option<String>) -> Self {
        let tag = reader
            .tag(die)
            .map_or_else(String::new, |tag| symbols::tag_string(tag.0.into()));
        let name = name
            .or_else(|| typename::type_name(reader, die))
            .or_else(|| reader.name(die));
        Self {
            offset: format!("{:x}", die.offset),
            tag,
            name,
        }
    }
}

#[derive(Clone, Debug)]
enum Content {
    Die { die: DieId, row: Row },
    Placeholder,
}

#[derive(Clone, Debug)]
struct Node {
    content: Content,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    state: NodeState,
    open: bool,
}

impl Node {
    fn placeholder(parent: Option<NodeId>) -> Self {
        Self {
            content: Content::Placeholder,
            parent,
            children: Vec::new(),
            state: NodeState::Expanded,
            open: false,
        }
    }
}

pub struct DieTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    options: Options,
    cursor: Option<NodeId>,
}

impl DieTree {
    /// One top-level node per unit of `space`, in file order.
    ///
    /// Partial units only exist to be imported, so they are left out
    /// unless imports are shown explicitly.
    pub fn build(reader: &dyn DwarfReader, space: UnitSpace, options: Options) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            options,
            cursor: None,
        };
        let mut offset = 0;
        while let Some(unit) = reader.next_unit(space, offset) {
            if unit.next <= unit.offset {
                tracing::debug!("unit at {:x} does not advance, stopping", unit.offset);
                break;
            }
            offset = unit.next;
            let tag = match reader.tag(unit.root) {
                Some(tag) => tag,
                None => continue,
            };
            if !options.explicit_imports && tag == gimli::DW_TAG_partial_unit {
                continue;
            }
            let name = reader
                .name(unit.root)
                .or_else(|| unit.signature.map(|sig| format!("{{{:016x}}}", sig)));
            let id = tree.alloc();
            tree.fill(reader, id, None, unit.root, name);
            tree.roots.push(id);
        }
        tracing::debug!("built tree with {} units", tree.roots.len());
        tree
    }

    fn alloc(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::placeholder(None));
        id
    }

    fn fill(
        &mut self,
        reader: &dyn DwarfReader,
        slot: NodeId,
        parent: Option<NodeId>,
        die: DieId,
        name: Option<String>,
    ) {
        let row = Row::new(reader, die, name);
        let has_children = reader.has_children(die);
        self.nodes[slot.0] = Node {
            content: Content::Die { die, row },
            parent,
            children: Vec::new(),
            state: if has_children {
                NodeState::Unexpanded
            } else {
                NodeState::Expanded
            },
            open: false,
        };
        if has_children {
            let placeholder = self.alloc();
            self.nodes[placeholder.0].parent = Some(slot);
            self.nodes[slot.0].children.push(placeholder);
        }
    }

    /// Materialize the children of `node`, returning whether it has any.
    ///
    /// Expanding an already expanded node changes nothing.
    pub fn expand(&mut self, reader: &dyn DwarfReader, node: NodeId) -> bool {
        let placeholder = match self.nodes[node.0].children.first() {
            None => return false,
            Some(&first) if !self.is_placeholder(first) => return true,
            Some(&first) => first,
        };
        let die = match self.die(node) {
            Some(die) => die,
            None => return false,
        };
        self.nodes[node.0].state = NodeState::Expanding;

        let mut path: Vec<DieId> = self.ancestors(node).filter_map(|n| self.die(n)).collect();
        path.push(die);
        let mut dies = Vec::new();
        collect_children(reader, &self.options, die, &mut path, &mut dies);
        tracing::trace!("expanded DIE {:x} into {} children", die.offset, dies.len());

        let mut children = Vec::with_capacity(dies.len());
        for (i, child) in dies.into_iter().enumerate() {
            let slot = if i == 0 { placeholder } else { self.alloc() };
            self.fill(reader, slot, Some(node), child, None);
            children.push(slot);
        }
        if children.is_empty() {
            self.nodes[placeholder.0].parent = None;
        }
        let node = &mut self.nodes[node.0];
        node.children = children;
        node.state = NodeState::Expanded;
        !node.children.is_empty()
    }

    /// Expand `node` and show its children.
    pub fn open(&mut self, reader: &dyn DwarfReader, node: NodeId) -> bool {
        let has_children = self.expand(reader, node);
        self.nodes[node.0].open = has_children;
        has_children
    }

    pub fn is_open(&self, node: NodeId) -> bool {
        self.nodes[node.0].open
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn n_children(&self, node: Option<NodeId>) -> usize {
        match node {
            Some(node) => self.children(node).len(),
            None => self.roots.len(),
        }
    }

    pub fn nth_child(&self, node: Option<NodeId>, n: usize) -> Option<NodeId> {
        match node {
            Some(node) => self.children(node).get(n).copied(),
            None => self.roots.get(n).copied(),
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn siblings(&self, node: NodeId) -> &[NodeId] {
        match self.parent(node) {
            Some(parent) => self.children(parent),
            None => &self.roots,
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.siblings(node);
        let index = siblings.iter().position(|&n| n == node)?;
        siblings.get(index + 1).copied()
    }

    /// Parents of `node`, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&n| self.parent(n))
    }

    pub fn state(&self, node: NodeId) -> NodeState {
        self.nodes[node.0].state
    }

    pub fn is_placeholder(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].content, Content::Placeholder)
    }

    /// The DIE behind `node`; `None` for a placeholder.
    pub fn die(&self, node: NodeId) -> Option<DieId> {
        match self.nodes[node.0].content {
            Content::Die { die, .. } => Some(die),
            Content::Placeholder => None,
        }
    }

    pub fn row(&self, node: NodeId) -> Option<&Row> {
        match &self.nodes[node.0].content {
            Content::Die { row, .. } => Some(row),
            Content::Placeholder => None,
        }
    }

    /// Child indices from the top level down to `node`.
    pub fn path(&self, node: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = node;
        loop {
            let index = self
                .siblings(current)
                .iter()
                .position(|&n| n == current)
                .unwrap_or_default();
            path.push(index);
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    pub fn node_at(&self, path: &[usize]) -> Option<NodeId> {
        let (&first, rest) = path.split_first()?;
        let mut node = *self.roots.get(first)?;
        for &index in rest {
            node = *self.children(node).get(index)?;
        }
        Some(node)
    }

    pub fn cursor(&self) -> Option<NodeId> {
        self.cursor
    }

    pub fn set_cursor(&mut self, node: NodeId) {
        self.cursor = Some(node);
    }
}

/// Push the children of `die` onto `out`, replacing each imported_unit
/// with the children of the unit it imports unless imports are explicit.
///
/// `path` holds the DIEs already being expanded; an import of one of them
/// is skipped.
fn collect_children(
    reader: &dyn DwarfReader,
    options: &Options,
    die: DieId,
    path: &mut Vec<DieId>,
    out: &mut Vec<DieId>,
) {
    for child in reader.children(die) {
        if options.explicit_imports || reader.tag(child) != Some(gimli::DW_TAG_imported_unit) {
            out.push(child);
            continue;
        }
        let import = match reader.reference(child, gimli::DW_AT_import) {
            Some(import) => import,
            None => {
                tracing::debug!("imported_unit {:x} has no usable import", child.offset);
                continue;
            }
        };
        if path.contains(&import) {
            tracing::debug!("import cycle through {:x}, skipping", import.offset);
            continue;
        }
        path.push(import);
        collect_children(reader, options, import, path, out);
        path.pop();
    }
}
