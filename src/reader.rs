//! The DWARF reader capability consumed by the tree, decoder and navigator.
//!
//! Everything above this trait deals only in [`DieId`]s and decoded
//! [`Attribute`]s; byte-level parsing happens behind it.

use gimli::{DwAt, DwForm, DwTag};

/// The section a DIE offset is relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// `.debug_info` of the main file
    Info,
    /// `.debug_types` of the main file
    Types,
    /// `.debug_info` of the supplementary (alt) file
    Sup,
}

/// Which list of units a tree is built over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnitSpace {
    Info,
    Types,
}

impl UnitSpace {
    pub fn section(self) -> Section {
        match self {
            Self::Info => Section::Info,
            Self::Types => Section::Types,
        }
    }
}

/// A globally unique identifier for a DIE within an opened image.
///
/// This is a copyable key, never a pointer: the image outlives every
/// view holding one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DieId {
    pub section: Section,
    /// Offset from the start of `section`
    pub offset: u64,
}

impl DieId {
    pub fn new(section: Section, offset: u64) -> Self {
        Self { section, offset }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnitHeader {
    /// Section offset of the unit header
    pub offset: u64,
    /// Section offset just past this unit
    pub next: u64,
    /// The unit's root DIE
    pub root: DieId,
    /// Type signature, for type units only
    pub signature: Option<u64>,
}

/// An attribute value, already extracted according to its form.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Address(u64),
    String(String),
    Reference(DieId),
    SecOffset(u64),
    Unsigned(u64),
    Signed(i64),
    Flag(bool),
    /// A block or expression; only its length is kept
    Block(usize),
    /// The form needs a lookup (string table, address table, signature,
    /// alt file) that failed
    Unresolved,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: DwAt,
    pub form: DwForm,
    pub value: AttrValue,
}

impl Attribute {
    pub fn reference(&self) -> Option<DieId> {
        match self.value {
            AttrValue::Reference(die) => Some(die),
            _ => None,
        }
    }
}

pub trait DwarfReader {
    /// The first unit in `space` whose header starts at or after `offset`.
    fn next_unit(&self, space: UnitSpace, offset: u64) -> Option<UnitHeader>;

    /// `None` means there is no DIE at that offset.
    fn tag(&self, die: DieId) -> Option<DwTag>;

    fn name(&self, die: DieId) -> Option<String>;

    fn has_children(&self, die: DieId) -> bool;

    /// The first child followed by its sibling chain.
    fn children(&self, die: DieId) -> Vec<DieId>;

    /// All attributes in declaration order.
    fn attributes(&self, die: DieId) -> Vec<Attribute>;

    fn unit_root(&self, die: DieId) -> Option<DieId>;

    /// Entry `index` of the file table of the unit owning `die`.
    fn source_file(&self, die: DieId, index: u64) -> Option<String>;

    fn attribute(&self, die: DieId, name: DwAt) -> Option<Attribute> {
        self.attributes(die).into_iter().find(|attr| attr.name == name)
    }

    /// The DIE an attribute refers to, if it is a reference that resolves
    /// to an existing DIE.
    fn reference(&self, die: DieId, name: DwAt) -> Option<DieId> {
        let target = self.attribute(die, name)?.reference()?;
        self.tag(target).map(|_| target)
    }
}
