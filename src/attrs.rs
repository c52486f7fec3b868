//! The attribute subtree shown for a selected DIE.

use crate::config::Options;
use crate::reader::{Attribute, DieId, DwarfReader};
use crate::{symbols, value};

/// One attribute of one DIE, with the attributes of its reference target
/// nested beneath it.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrRow {
    /// The DIE carrying the attribute
    pub die: DieId,
    pub attribute: Attribute,
    pub name: String,
    pub form: String,
    pub value: Option<String>,
    pub children: Vec<AttrRow>,
}

impl AttrRow {
    /// The DIE to navigate to when this row is activated.
    pub fn target(&self) -> Option<DieId> {
        self.attribute.reference()
    }
}

/// Attribute rows of `die` in declaration order.
///
/// Every non-sibling reference is followed into its target's attributes
/// unless the target is already on the chain from `die` down to the row.
pub fn attribute_tree(reader: &dyn DwarfReader, die: DieId, options: &Options) -> Vec<AttrRow> {
    rows_on_chain(reader, die, options, &mut vec![die])
}

fn rows_on_chain(
    reader: &dyn DwarfReader,
    die: DieId,
    options: &Options,
    chain: &mut Vec<DieId>,
) -> Vec<AttrRow> {
    let mut rows = Vec::new();
    for attribute in reader.attributes(die) {
        let sibling = attribute.name == gimli::DW_AT_sibling;
        if sibling && !options.explicit_siblings {
            continue;
        }
        let mut children = Vec::new();
        match attribute.reference() {
            Some(target) if !sibling && reader.tag(target).is_some() => {
                if chain.contains(&target) {
                    tracing::trace!("{:x} is already on the chain, not following", target.offset);
                } else {
                    chain.push(target);
                    children = rows_on_chain(reader, target, options, chain);
                    chain.pop();
                }
            }
            _ => {}
        }
        rows.push(AttrRow {
            die,
            name: symbols::attribute_string(attribute.name.0.into()),
            form: symbols::form_string(attribute.form.0.into()),
            value: value::decode(reader, die, &attribute),
            attribute,
            children,
        });
    }
    rows
}

/// The shown attribute of `die` whose display name is closest to `wanted`.
pub fn closest_attribute(
    reader: &dyn DwarfReader,
    die: DieId,
    wanted: &str,
    options: &Options,
) -> Option<String> {
    reader
        .attributes(die)
        .iter()
        .filter(|attr| options.explicit_siblings || attr.name != gimli::DW_AT_sibling)
        .map(|attr| symbols::attribute_string(attr.name.0.into()))
        .min_by_key(|name| strsim::levenshtein(name, wanted))
}

/// Whether `die` has the attribute displayed as `wanted`, but `options`
/// keep it out of the rows.
pub fn is_hidden(reader: &dyn DwarfReader, die: DieId, wanted: &str, options: &Options) -> bool {
    !options.explicit_siblings
        && wanted == symbols::attribute_string(gimli::DW_AT_sibling.0.into())
        && reader.attribute(die, gimli::DW_AT_sibling).is_some()
}
