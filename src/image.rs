//! The [`DwarfReader`] over a real ELF file.
//!
//! Every DWARF section is copied out of the file once, decompressed and,
//! for relocatable objects such as kernel modules, relocated. A file
//! without DWARF is replaced by its separate debug file.

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use gimli::{DwAt, DwForm, DwTag, Endianity, RunTimeEndian};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, RelocationKind, RelocationTarget};

use crate::error::{Error, Result};
use crate::locate;
use crate::reader::{AttrValue, Attribute, DieId, DwarfReader, Section, UnitHeader, UnitSpace};

type Slice<'a> = gimli::EndianSlice<'a, RunTimeEndian>;
type Dwarf<'a> = gimli::Dwarf<Slice<'a>>;
type Unit<'a> = gimli::Unit<Slice<'a>>;
type Entry<'u, 'a> = gimli::DebuggingInformationEntry<'u, 'u, Slice<'a>>;
type RawValue<'a> = gimli::AttributeValue<Slice<'a>>;

/// The files an [`Image`] was read from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Files {
    /// The file that was asked for
    pub main: PathBuf,
    /// Separate debug file, when the main file carries no DWARF
    pub debug: Option<PathBuf>,
    pub alt: Option<PathBuf>,
}

/// The `.debug_*` sections of one ELF file, keyed by name.
struct Sections {
    endian: RunTimeEndian,
    data: HashMap<String, Vec<u8>>,
}

impl Sections {
    fn read(file: &object::File<'_>) -> Result<Self> {
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let relocatable = file.kind() == ObjectKind::Relocatable;
        let mut data = HashMap::new();
        for section in file.sections() {
            let name = match section.name() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let name = match name.strip_prefix(".zdebug_") {
                Some(rest) => format!(".debug_{}", rest),
                None if name.starts_with(".debug_") => name.to_string(),
                None => continue,
            };
            let mut bytes = section.uncompressed_data()?.into_owned();
            if relocatable {
                relocate(file, &section, &mut bytes, endian);
            }
            tracing::trace!("loaded {} ({} bytes)", name, bytes.len());
            data.insert(name, bytes);
        }
        Ok(Self { endian, data })
    }

    fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file = object::File::parse(&*bytes)?;
        Self::read(&file)
    }

    fn load<'a>(&'a self) -> Result<Dwarf<'a>> {
        gimli::Dwarf::load(|id| -> Result<Slice<'a>> {
            let data = self.data.get(id.name()).map_or(&[][..], Vec::as_slice);
            Ok(gimli::EndianSlice::new(data, self.endian))
        })
    }
}

/// Apply the absolute relocations of `section` to `data`, its contents.
fn relocate(
    file: &object::File<'_>,
    section: &object::Section<'_, '_>,
    data: &mut [u8],
    endian: RunTimeEndian,
) {
    for (offset, relocation) in section.relocations() {
        if relocation.kind() != RelocationKind::Absolute {
            tracing::debug!("ignoring {:?} relocation at {:x}", relocation.kind(), offset);
            continue;
        }
        let base = match relocation.target() {
            RelocationTarget::Symbol(index) => file.symbol_by_index(index).map(|s| s.address()),
            RelocationTarget::Section(index) => file.section_by_index(index).map(|s| s.address()),
            _ => Ok(0),
        };
        let base = match base {
            Ok(base) => base,
            Err(err) => {
                tracing::debug!("bad relocation target at {:x}: {}", offset, err);
                continue;
            }
        };
        let value = base.wrapping_add(relocation.addend() as u64);
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let width = usize::from(relocation.size() / 8);
        let field = match data.get_mut(start..start.saturating_add(width)) {
            Some(field) => field,
            None => {
                tracing::debug!("relocation at {:x} lies outside the section", offset);
                continue;
            }
        };
        match width {
            4 => {
                let implicit = if relocation.has_implicit_addend() {
                    u64::from(endian.read_u32(field))
                } else {
                    0
                };
                endian.write_u32(field, value.wrapping_add(implicit) as u32);
            }
            8 => {
                let implicit = if relocation.has_implicit_addend() {
                    endian.read_u64(field)
                } else {
                    0
                };
                endian.write_u64(field, value.wrapping_add(implicit));
            }
            _ => tracing::debug!("ignoring {}-bit relocation at {:x}", width * 8, offset),
        }
    }
}

/// Whether `file` has a non-empty .debug_info or .debug_types.
fn has_dwarf(file: &object::File<'_>) -> bool {
    [".debug_info", ".debug_types"].iter().any(|name| {
        file.section_by_name(name)
            .and_then(|section| section.file_range())
            .map_or(false, |(_, size)| size > 0)
    })
}

/// The supplementary file named by the `.gnu_debugaltlink` of `file`.
fn alt_link(path: &Path, file: &object::File<'_>) -> Option<PathBuf> {
    match file.gnu_debugaltlink() {
        Ok(Some((link, _))) => locate::alt_path(path, link),
        Ok(None) => None,
        Err(err) => {
            tracing::debug!("unreadable .gnu_debugaltlink in {}: {}", path.display(), err);
            None
        }
    }
}

/// The separate debug file of `file`: by build id first, then by
/// `.gnu_debuglink`. A candidate must have DWARF and, when both carry
/// one, the same build id.
fn find_debug_file(path: &Path, file: &object::File<'_>) -> Option<(PathBuf, Vec<u8>)> {
    let root = Path::new(locate::DEBUG_ROOT);
    let build_id = file.build_id().ok().flatten();
    let mut candidates: Vec<PathBuf> = build_id
        .and_then(|id| locate::build_id_path(root, id))
        .into_iter()
        .collect();
    if let Ok(Some((link, _))) = file.gnu_debuglink() {
        match std::str::from_utf8(link) {
            Ok(link) => candidates.extend(locate::debuglink_candidates(root, path, link)),
            Err(_) => tracing::debug!("ignoring non UTF-8 .gnu_debuglink in {}", path.display()),
        }
    }
    candidates
        .into_iter()
        .filter(|candidate| candidate != path)
        .find_map(|candidate| {
            let bytes = fs::read(&candidate).ok()?;
            if debug_file_matches(&bytes, build_id) {
                Some((candidate, bytes))
            } else {
                tracing::debug!("{} is not the debug file", candidate.display());
                None
            }
        })
}

fn debug_file_matches(bytes: &[u8], build_id: Option<&[u8]>) -> bool {
    let file = match object::File::parse(bytes) {
        Ok(file) => file,
        Err(_) => return false,
    };
    if !has_dwarf(&file) {
        return false;
    }
    !matches!((build_id, file.build_id()), (Some(want), Ok(Some(got))) if want != got)
}

/// The DWARF sections of an object file and of its supplementary file.
pub struct Image {
    files: Files,
    main: Sections,
    alt: Option<Sections>,
}

impl Image {
    /// Read `path`, or its separate debug file when it has no DWARF. The
    /// supplementary file is `alt` when given, otherwise whatever
    /// `.gnu_debugaltlink` names.
    pub fn open(path: &Path, alt: Option<&Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file = object::File::parse(&*bytes)?;
        let (debug, main, link) = if has_dwarf(&file) {
            (None, Sections::read(&file)?, alt_link(path, &file))
        } else {
            let (found, bytes) = find_debug_file(path, &file)
                .ok_or_else(|| Error::NoDwarf(path.display().to_string()))?;
            tracing::debug!("using separate debug file {}", found.display());
            let debug = object::File::parse(&*bytes)?;
            let sections = Sections::read(&debug)?;
            let link = alt_link(&found, &debug);
            (Some(found), sections, link)
        };
        let alt_path = alt.map(Path::to_path_buf).or(link);
        let alt = alt_path.and_then(|alt_path| match Sections::open(&alt_path) {
            Ok(sections) => {
                tracing::debug!("using supplementary file {}", alt_path.display());
                Some((alt_path, sections))
            }
            Err(err) => {
                tracing::warn!("cannot read supplementary file {}: {}", alt_path.display(), err);
                None
            }
        });
        let (alt_path, alt) = match alt {
            Some((alt_path, alt)) => (Some(alt_path), Some(alt)),
            None => (None, None),
        };
        Ok(Self {
            files: Files {
                main: path.to_path_buf(),
                debug,
                alt: alt_path,
            },
            main,
            alt,
        })
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    pub fn dwarf(&self) -> Result<DwarfImage<'_>> {
        let dwarf = self.main.load()?;
        let sup = match &self.alt {
            Some(alt) => match alt.load() {
                Ok(sup) => Some(sup),
                Err(err) => {
                    tracing::warn!("ignoring supplementary file: {}", err);
                    None
                }
            },
            None => None,
        };
        DwarfImage::new(dwarf, sup)
    }
}

struct LoadedUnit<'a> {
    section: Section,
    /// Section offset of the header
    offset: u64,
    /// Section offset just past the unit
    end: u64,
    /// Unit offset of the root DIE
    root: u64,
    signature: Option<u64>,
    /// Unit offset of the type DIE of a type unit
    type_offset: u64,
    unit: Unit<'a>,
    /// Unit offsets of every DIE, in order, gathered on first lookup
    dies: OnceCell<Vec<usize>>,
}

impl LoadedUnit<'_> {
    fn die(&self, offset: usize) -> DieId {
        DieId::new(self.section, self.offset + offset as u64)
    }

    /// Whether a DIE starts at `offset`.
    fn has_die(&self, offset: gimli::UnitOffset) -> bool {
        let dies = self.dies.get_or_init(|| {
            let mut dies = Vec::new();
            let mut entries = self.unit.entries();
            loop {
                match entries.next_dfs() {
                    Ok(Some((_, entry))) => dies.push(entry.offset().0),
                    Ok(None) => break,
                    Err(err) => {
                        tracing::debug!("DIEs of unit {:x} cut short: {}", self.offset, err);
                        break;
                    }
                }
            }
            dies
        });
        dies.binary_search(&offset.0).is_ok()
    }
}

fn load_unit<'a>(
    dwarf: &Dwarf<'a>,
    section: Section,
    header: gimli::UnitHeader<Slice<'a>>,
) -> Option<LoadedUnit<'a>> {
    let offset = match header.offset() {
        gimli::UnitSectionOffset::DebugInfoOffset(o) => o.0 as u64,
        gimli::UnitSectionOffset::DebugTypesOffset(o) => o.0 as u64,
    };
    let end = offset + header.length_including_self() as u64;
    let (signature, type_offset) = match header.type_() {
        gimli::UnitType::Type {
            type_signature,
            type_offset,
        }
        | gimli::UnitType::SplitType {
            type_signature,
            type_offset,
        } => (Some(type_signature.0), type_offset.0 as u64),
        _ => (None, 0),
    };
    let unit = match dwarf.unit(header) {
        Ok(unit) => unit,
        Err(err) => {
            tracing::warn!("skipping unit at {:x}: {}", offset, err);
            return None;
        }
    };
    let root = {
        let mut entries = unit.entries();
        match entries.next_dfs() {
            Ok(Some((_, entry))) => entry.offset().0 as u64,
            Ok(None) => {
                tracing::warn!("skipping empty unit at {:x}", offset);
                return None;
            }
            Err(err) => {
                tracing::warn!("skipping unit at {:x}: {}", offset, err);
                return None;
            }
        }
    };
    Some(LoadedUnit {
        section,
        offset,
        end,
        root,
        signature,
        type_offset,
        unit,
        dies: OnceCell::new(),
    })
}

/// Parsed DWARF of an [`Image`], with every unit header loaded up front.
pub struct DwarfImage<'a> {
    dwarf: Dwarf<'a>,
    sup: Option<Dwarf<'a>>,
    /// Sorted by section, then offset
    units: Vec<LoadedUnit<'a>>,
    /// Type signature to type DIE
    signatures: BTreeMap<u64, DieId>,
}

impl<'a> DwarfImage<'a> {
    fn new(dwarf: Dwarf<'a>, sup: Option<Dwarf<'a>>) -> Result<Self> {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            units.extend(load_unit(&dwarf, Section::Info, header));
        }
        let mut headers = dwarf.type_units();
        while let Some(header) = headers.next()? {
            units.extend(load_unit(&dwarf, Section::Types, header));
        }
        if let Some(sup) = &sup {
            let mut headers = sup.units();
            while let Some(header) = headers.next()? {
                units.extend(load_unit(sup, Section::Sup, header));
            }
        }
        units.sort_by_key(|unit| (unit.section, unit.offset));

        let signatures = units
            .iter()
            .filter_map(|unit| {
                let signature = unit.signature?;
                Some((signature, DieId::new(unit.section, unit.offset + unit.type_offset)))
            })
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(
            "loaded {} units, {} type signatures",
            units.len(),
            signatures.len()
        );
        Ok(Self {
            dwarf,
            sup,
            units,
            signatures,
        })
    }

    fn dwarf_for(&self, section: Section) -> Option<&Dwarf<'a>> {
        match section {
            Section::Sup => self.sup.as_ref(),
            Section::Info | Section::Types => Some(&self.dwarf),
        }
    }

    fn locate(&self, die: DieId) -> Option<(&LoadedUnit<'a>, gimli::UnitOffset)> {
        let index = self
            .units
            .partition_point(|unit| (unit.section, unit.offset) <= (die.section, die.offset));
        let unit = self.units.get(index.checked_sub(1)?)?;
        if unit.section != die.section || die.offset >= unit.end {
            return None;
        }
        let offset = gimli::UnitOffset(usize::try_from(die.offset - unit.offset).ok()?);
        if !unit.has_die(offset) {
            tracing::debug!("no DIE starts at {:x}", die.offset);
            return None;
        }
        Some((unit, offset))
    }

    fn entry(&self, die: DieId) -> Option<(&LoadedUnit<'a>, Entry<'_, 'a>)> {
        let (unit, offset) = self.locate(die)?;
        match unit.unit.entry(offset) {
            Ok(entry) => Some((unit, entry)),
            Err(err) => {
                tracing::debug!("no DIE at {:x}: {}", die.offset, err);
                None
            }
        }
    }

    fn string(&self, unit: &LoadedUnit<'a>, value: RawValue<'a>) -> AttrValue {
        let dwarf = match self.dwarf_for(unit.section) {
            Some(dwarf) => dwarf,
            None => return AttrValue::Unresolved,
        };
        let string = match value {
            gimli::AttributeValue::DebugStrRefSup(offset) => match &self.sup {
                Some(sup) => sup.debug_str.get_str(offset),
                None => return AttrValue::Unresolved,
            },
            value => dwarf.attr_string(&unit.unit, value),
        };
        match string {
            Ok(string) => AttrValue::String(string.to_string_lossy().into_owned()),
            Err(err) => {
                tracing::debug!("unresolved string in unit {:x}: {}", unit.offset, err);
                AttrValue::Unresolved
            }
        }
    }

    /// Resolve a raw attribute value read from `unit`.
    fn convert(&self, unit: &LoadedUnit<'a>, value: RawValue<'a>) -> AttrValue {
        use gimli::AttributeValue as V;
        match value {
            V::Addr(addr) => AttrValue::Address(addr),
            V::DebugAddrIndex(index) => {
                let addr = self
                    .dwarf_for(unit.section)
                    .and_then(|dwarf| dwarf.address(&unit.unit, index).ok());
                addr.map_or(AttrValue::Unresolved, AttrValue::Address)
            }
            V::String(_)
            | V::DebugStrRef(_)
            | V::DebugStrRefSup(_)
            | V::DebugLineStrRef(_)
            | V::DebugStrOffsetsIndex(_) => self.string(unit, value),
            V::UnitRef(offset) => AttrValue::Reference(unit.die(offset.0)),
            V::DebugInfoRef(offset) => {
                let section = match unit.section {
                    Section::Sup => Section::Sup,
                    Section::Info | Section::Types => Section::Info,
                };
                AttrValue::Reference(DieId::new(section, offset.0 as u64))
            }
            V::DebugInfoRefSup(offset) => {
                AttrValue::Reference(DieId::new(Section::Sup, offset.0 as u64))
            }
            V::DebugTypesRef(signature) => match self.signatures.get(&signature.0) {
                Some(&die) => AttrValue::Reference(die),
                None => {
                    tracing::debug!("no type unit with signature {:016x}", signature.0);
                    AttrValue::Unresolved
                }
            },
            V::SecOffset(offset) => AttrValue::SecOffset(offset as u64),
            V::Data1(value) => AttrValue::Unsigned(value.into()),
            V::Data2(value) => AttrValue::Unsigned(value.into()),
            V::Data4(value) => AttrValue::Unsigned(value.into()),
            V::Data8(value) => AttrValue::Unsigned(value),
            V::Udata(value) => AttrValue::Unsigned(value),
            V::Sdata(value) => AttrValue::Signed(value),
            V::Flag(flag) => AttrValue::Flag(flag),
            V::Block(block) => AttrValue::Block(block.len()),
            V::Exprloc(expression) => AttrValue::Block(expression.0.len()),
            _ => AttrValue::Other,
        }
    }
}

impl DwarfReader for DwarfImage<'_> {
    fn next_unit(&self, space: UnitSpace, offset: u64) -> Option<UnitHeader> {
        let section = space.section();
        let unit = self
            .units
            .iter()
            .find(|unit| unit.section == section && unit.offset >= offset)?;
        Some(UnitHeader {
            offset: unit.offset,
            next: unit.end,
            root: DieId::new(section, unit.offset + unit.root),
            signature: unit.signature,
        })
    }

    fn tag(&self, die: DieId) -> Option<DwTag> {
        self.entry(die).map(|(_, entry)| entry.tag())
    }

    fn name(&self, die: DieId) -> Option<String> {
        let (unit, entry) = self.entry(die)?;
        let attr = entry.attr(gimli::DW_AT_name).ok()??;
        match self.convert(unit, attr.raw_value()) {
            AttrValue::String(name) => Some(name),
            _ => None,
        }
    }

    fn has_children(&self, die: DieId) -> bool {
        self.entry(die).map_or(false, |(_, entry)| entry.has_children())
    }

    fn children(&self, die: DieId) -> Vec<DieId> {
        let mut children = Vec::new();
        let (unit, offset) = match self.locate(die) {
            Some(found) => found,
            None => return children,
        };
        let mut tree = match unit.unit.entries_tree(Some(offset)) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::debug!("cannot walk DIE {:x}: {}", die.offset, err);
                return children;
            }
        };
        let root = match tree.root() {
            Ok(root) => root,
            Err(err) => {
                tracing::debug!("cannot walk DIE {:x}: {}", die.offset, err);
                return children;
            }
        };
        let mut iter = root.children();
        loop {
            match iter.next() {
                Ok(Some(child)) => children.push(unit.die(child.entry().offset().0)),
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!("children of {:x} cut short: {}", die.offset, err);
                    break;
                }
            }
        }
        children
    }

    fn attributes(&self, die: DieId) -> Vec<Attribute> {
        let mut out = Vec::new();
        let (unit, entry) = match self.entry(die) {
            Some(found) => found,
            None => return out,
        };
        // Forms as written in the abbreviation, so DW_FORM_indirect survives
        let forms: Vec<DwForm> = unit
            .unit
            .abbreviations
            .get(entry.code())
            .map(|abbrev| abbrev.attributes().iter().map(|spec| spec.form()).collect())
            .unwrap_or_default();
        let mut attrs = entry.attrs();
        loop {
            match attrs.next() {
                Ok(Some(attr)) => {
                    let name: DwAt = attr.name();
                    out.push(Attribute {
                        name,
                        form: forms.get(out.len()).copied().unwrap_or(DwForm(0)),
                        value: self.convert(unit, attr.raw_value()),
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!("attributes of {:x} cut short: {}", die.offset, err);
                    break;
                }
            }
        }
        out
    }

    fn unit_root(&self, die: DieId) -> Option<DieId> {
        let (unit, _) = self.locate(die)?;
        Some(DieId::new(unit.section, unit.offset + unit.root))
    }

    fn source_file(&self, die: DieId, index: u64) -> Option<String> {
        let (unit, _) = self.locate(die)?;
        let dwarf = self.dwarf_for(unit.section)?;
        let program = unit.unit.line_program.as_ref()?;
        let header = program.header();
        let file = header.file(index)?;
        let name = dwarf.attr_string(&unit.unit, file.path_name()).ok()?;
        let name = name.to_string_lossy().into_owned();
        if name.starts_with('/') {
            return Some(name);
        }
        let directory = file
            .directory(header)
            .and_then(|dir| dwarf.attr_string(&unit.unit, dir).ok())
            .map(|dir| dir.to_string_lossy().into_owned());
        match directory {
            Some(dir) if !dir.is_empty() => Some(format!("{}/{}", dir.trim_end_matches('/'), name)),
            _ => Some(name),
        }
    }
}
