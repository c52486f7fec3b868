//! Moving the tree cursor to the target of a followed reference.
//!
//! The search is depth first from the cursor, then from each ancestor in
//! turn up to the unit root. Only nodes on the way are expanded; a target
//! outside the cursor's unit is left alone.

use crate::reader::{DieId, DwarfReader};
use crate::tree::{DieTree, NodeId};

/// Select `target`, searching outward from the cursor.
///
/// On success every ancestor of the target is opened and the cursor moves
/// to it. Without a cursor, or when the target is out of reach, nothing
/// changes.
pub fn navigate(tree: &mut DieTree, reader: &dyn DwarfReader, target: DieId) -> Option<NodeId> {
    let from = tree.cursor()?;
    let found = search(tree, reader, from, target);
    match found {
        Some(found) => reveal_node(tree, reader, found),
        None => tracing::debug!("{:x} is not reachable from the cursor", target.offset),
    }
    found
}

/// Select `die` by searching every unit from its root, the unit that
/// owns it first.
pub fn reveal(tree: &mut DieTree, reader: &dyn DwarfReader, die: DieId) -> Option<NodeId> {
    let home = reader.unit_root(die);
    let mut roots = tree.roots().to_vec();
    // An imported DIE shows under whichever unit imports it
    roots.sort_by_key(|&root| home.is_none() || tree.die(root) != home);
    let found = roots
        .into_iter()
        .find_map(|root| search_down(tree, reader, root, die, None))?;
    reveal_node(tree, reader, found);
    Some(found)
}

fn reveal_node(tree: &mut DieTree, reader: &dyn DwarfReader, node: NodeId) {
    let ancestors: Vec<NodeId> = tree.ancestors(node).collect();
    for ancestor in ancestors.into_iter().rev() {
        tree.open(reader, ancestor);
    }
    tree.set_cursor(node);
}

fn search(
    tree: &mut DieTree,
    reader: &dyn DwarfReader,
    from: NodeId,
    target: DieId,
) -> Option<NodeId> {
    let mut node = from;
    let mut searched = None;
    loop {
        if let Some(found) = search_down(tree, reader, node, target, searched) {
            return Some(found);
        }
        let parent = tree.parent(node)?;
        tracing::trace!("climbing to {:?} looking for {:x}", parent, target.offset);
        searched = Some(node);
        node = parent;
    }
}

/// Depth-first search of the subtree at `node`, leaving out the child
/// `skip` that an earlier pass already covered.
fn search_down(
    tree: &mut DieTree,
    reader: &dyn DwarfReader,
    node: NodeId,
    target: DieId,
    skip: Option<NodeId>,
) -> Option<NodeId> {
    if tree.die(node) == Some(target) {
        return Some(node);
    }
    if !tree.expand(reader, node) {
        return None;
    }
    let children = tree.children(node).to_vec();
    children
        .into_iter()
        .filter(|&child| Some(child) != skip)
        .find_map(|child| search_down(tree, reader, child, target, None))
}
