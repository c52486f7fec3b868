//! An in-memory [`DwarfReader`] for unit tests.

use std::collections::BTreeMap;

use gimli::{DwAt, DwForm, DwTag};

use crate::reader::{AttrValue, Attribute, DieId, DwarfReader, Section, UnitHeader, UnitSpace};

struct FakeDie {
    tag: DwTag,
    attrs: Vec<Attribute>,
    children: Vec<DieId>,
    root: DieId,
}

struct FakeUnit {
    offset: u64,
    root: DieId,
    signature: Option<u64>,
}

#[derive(Default)]
pub struct FakeDwarf {
    next_offset: BTreeMap<Section, u64>,
    units: BTreeMap<Section, Vec<FakeUnit>>,
    dies: BTreeMap<DieId, FakeDie>,
    files: BTreeMap<DieId, Vec<String>>,
}

impl FakeDwarf {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, section: Section, size: u64) -> u64 {
        let next = self.next_offset.entry(section).or_insert(0);
        let offset = *next;
        *next += size;
        offset
    }

    /// Add a unit whose root DIE has `tag`.
    pub fn unit(&mut self, section: Section, tag: DwTag, signature: Option<u64>) -> DieId {
        let offset = self.alloc(section, 0xb);
        let root = DieId::new(section, self.alloc(section, 0x8));
        self.units.entry(section).or_default().push(FakeUnit {
            offset,
            root,
            signature,
        });
        self.dies.insert(
            root,
            FakeDie {
                tag,
                attrs: Vec::new(),
                children: Vec::new(),
                root,
            },
        );
        root
    }

    pub fn compile_unit(&mut self, name: &str) -> DieId {
        let root = self.unit(Section::Info, gimli::DW_TAG_compile_unit, None);
        self.name(root, name)
    }

    /// Add a child at the end of `parent`'s children.
    pub fn die(&mut self, parent: DieId, tag: DwTag) -> DieId {
        let die = DieId::new(parent.section, self.alloc(parent.section, 0x8));
        let root = self.dies[&parent].root;
        self.dies.insert(
            die,
            FakeDie {
                tag,
                attrs: Vec::new(),
                children: Vec::new(),
                root,
            },
        );
        self.dies.get_mut(&parent).unwrap().children.push(die);
        die
    }

    pub fn attr(&mut self, die: DieId, name: DwAt, form: DwForm, value: AttrValue) -> DieId {
        self.dies
            .get_mut(&die)
            .unwrap()
            .attrs
            .push(Attribute { name, form, value });
        die
    }

    pub fn name(&mut self, die: DieId, name: &str) -> DieId {
        self.attr(
            die,
            gimli::DW_AT_name,
            gimli::DW_FORM_strp,
            AttrValue::String(name.to_string()),
        )
    }

    pub fn reference(&mut self, die: DieId, name: DwAt, target: DieId) -> DieId {
        self.attr(die, name, gimli::DW_FORM_ref4, AttrValue::Reference(target))
    }

    pub fn type_of(&mut self, die: DieId, target: DieId) -> DieId {
        self.reference(die, gimli::DW_AT_type, target)
    }

    /// A named DIE under `parent`.
    pub fn named(&mut self, parent: DieId, tag: DwTag, name: &str) -> DieId {
        let die = self.die(parent, tag);
        self.name(die, name)
    }

    /// A modifier (pointer, const, ...) of `target` under `parent`.
    pub fn modifier(&mut self, parent: DieId, tag: DwTag, target: Option<DieId>) -> DieId {
        let die = self.die(parent, tag);
        match target {
            Some(target) => self.type_of(die, target),
            None => die,
        }
    }

    pub fn file_table(&mut self, root: DieId, files: &[&str]) {
        self.files
            .insert(root, files.iter().map(|f| f.to_string()).collect());
    }
}

impl DwarfReader for FakeDwarf {
    fn next_unit(&self, space: UnitSpace, offset: u64) -> Option<UnitHeader> {
        let units = self.units.get(&space.section())?;
        let index = units.iter().position(|u| u.offset >= offset)?;
        let unit = &units[index];
        let next = units
            .get(index + 1)
            .map_or(unit.offset + 1, |next| next.offset);
        Some(UnitHeader {
            offset: unit.offset,
            next,
            root: unit.root,
            signature: unit.signature,
        })
    }

    fn tag(&self, die: DieId) -> Option<DwTag> {
        self.dies.get(&die).map(|d| d.tag)
    }

    fn name(&self, die: DieId) -> Option<String> {
        match self.attribute(die, gimli::DW_AT_name)?.value {
            AttrValue::String(name) => Some(name),
            _ => None,
        }
    }

    fn has_children(&self, die: DieId) -> bool {
        self.dies.get(&die).map_or(false, |d| !d.children.is_empty())
    }

    fn children(&self, die: DieId) -> Vec<DieId> {
        self.dies
            .get(&die)
            .map(|d| d.children.clone())
            .unwrap_or_default()
    }

    fn attributes(&self, die: DieId) -> Vec<Attribute> {
        self.dies
            .get(&die)
            .map(|d| d.attrs.clone())
            .unwrap_or_default()
    }

    fn unit_root(&self, die: DieId) -> Option<DieId> {
        self.dies.get(&die).map(|d| d.root)
    }

    fn source_file(&self, die: DieId, index: u64) -> Option<String> {
        let root = self.unit_root(die)?;
        let index = usize::try_from(index).ok()?;
        self.files.get(&root)?.get(index).cloned()
    }
}
