//! Attribute values rendered for display.

use gimli::{DwAt, DwForm};

use crate::reader::{AttrValue, Attribute, DieId, DwarfReader};
use crate::symbols;

/// Forms grouped by how their values are rendered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormClass {
    Address,
    String,
    Reference,
    SecOffset,
    Constant,
    Flag,
    FlagPresent,
    /// Blocks and expressions; never rendered
    Block,
    Unknown(DwForm),
}

impl From<DwForm> for FormClass {
    fn from(form: DwForm) -> Self {
        match form {
            gimli::DW_FORM_addr
            | gimli::DW_FORM_addrx
            | gimli::DW_FORM_addrx1
            | gimli::DW_FORM_addrx2
            | gimli::DW_FORM_addrx3
            | gimli::DW_FORM_addrx4
            | gimli::DW_FORM_GNU_addr_index => Self::Address,
            gimli::DW_FORM_string
            | gimli::DW_FORM_strp
            | gimli::DW_FORM_indirect
            | gimli::DW_FORM_GNU_strp_alt
            | gimli::DW_FORM_strp_sup
            | gimli::DW_FORM_line_strp
            | gimli::DW_FORM_strx
            | gimli::DW_FORM_strx1
            | gimli::DW_FORM_strx2
            | gimli::DW_FORM_strx3
            | gimli::DW_FORM_strx4
            | gimli::DW_FORM_GNU_str_index => Self::String,
            gimli::DW_FORM_ref_addr
            | gimli::DW_FORM_ref1
            | gimli::DW_FORM_ref2
            | gimli::DW_FORM_ref4
            | gimli::DW_FORM_ref8
            | gimli::DW_FORM_ref_udata
            | gimli::DW_FORM_ref_sig8
            | gimli::DW_FORM_ref_sup4
            | gimli::DW_FORM_ref_sup8
            | gimli::DW_FORM_GNU_ref_alt => Self::Reference,
            gimli::DW_FORM_sec_offset => Self::SecOffset,
            gimli::DW_FORM_udata
            | gimli::DW_FORM_sdata
            | gimli::DW_FORM_implicit_const
            | gimli::DW_FORM_data1
            | gimli::DW_FORM_data2
            | gimli::DW_FORM_data4
            | gimli::DW_FORM_data8 => Self::Constant,
            gimli::DW_FORM_flag => Self::Flag,
            gimli::DW_FORM_flag_present => Self::FlagPresent,
            gimli::DW_FORM_block
            | gimli::DW_FORM_block1
            | gimli::DW_FORM_block2
            | gimli::DW_FORM_block4
            | gimli::DW_FORM_exprloc => Self::Block,
            form => Self::Unknown(form),
        }
    }
}

/// Render the value of `attr`, owned by `die`.
///
/// `None` covers both an unsupported form (blocks, expressions) and a
/// lookup that failed; neither is an error.
pub fn decode(reader: &dyn DwarfReader, die: DieId, attr: &Attribute) -> Option<String> {
    // DW_FORM_indirect names its real form inline; dispatch on the value
    let class = match (attr.form, &attr.value) {
        (gimli::DW_FORM_indirect, value) => indirect_class(value),
        (form, _) => FormClass::from(form),
    };
    match (class, &attr.value) {
        (FormClass::Address, &AttrValue::Address(addr)) => Some(format!("{:#x}", addr)),
        (FormClass::String, AttrValue::String(s)) => Some(s.clone()),
        (FormClass::Reference, &AttrValue::Reference(target)) => reference_string(reader, target),
        (FormClass::SecOffset, &AttrValue::SecOffset(offset)) => Some(format!("[{:x}]", offset)),
        (FormClass::Constant, &AttrValue::Unsigned(value)) => {
            Some(constant_string(reader, die, attr.name, Constant::Unsigned(value)))
        }
        (FormClass::Constant, &AttrValue::Signed(value)) => {
            Some(constant_string(reader, die, attr.name, Constant::Signed(value)))
        }
        (FormClass::Flag, &AttrValue::Flag(flag)) => Some(yes_no(flag)),
        (FormClass::FlagPresent, _) => Some(yes_no(true)),
        _ => None,
    }
}

fn indirect_class(value: &AttrValue) -> FormClass {
    match value {
        AttrValue::String(_) | AttrValue::Unresolved => FormClass::String,
        AttrValue::Address(_) => FormClass::Address,
        AttrValue::Reference(_) => FormClass::Reference,
        AttrValue::SecOffset(_) => FormClass::SecOffset,
        AttrValue::Unsigned(_) | AttrValue::Signed(_) => FormClass::Constant,
        AttrValue::Flag(_) => FormClass::Flag,
        _ => FormClass::Block,
    }
}

fn yes_no(flag: bool) -> String {
    let flag = if flag { "yes" } else { "no" };
    flag.to_string()
}

/// `[offset] tag` for a reference target, if it resolves.
pub fn reference_string(reader: &dyn DwarfReader, target: DieId) -> Option<String> {
    let tag = reader.tag(target)?;
    Some(format!(
        "[{:x}] {}",
        target.offset,
        symbols::tag_string(tag.0.into())
    ))
}

#[derive(Copy, Clone, Debug)]
enum Constant {
    Unsigned(u64),
    Signed(i64),
}

impl Constant {
    /// The value as the unsigned code the enumerated attributes expect.
    fn code(self) -> u64 {
        match self {
            Self::Unsigned(value) => value,
            Self::Signed(value) => value as u64,
        }
    }
}

fn constant_string(reader: &dyn DwarfReader, die: DieId, name: DwAt, value: Constant) -> String {
    let code = value.code();
    match name {
        gimli::DW_AT_decl_file | gimli::DW_AT_call_file => {
            let index = match value {
                Constant::Unsigned(index) => Some(index),
                Constant::Signed(index) => u64::try_from(index).ok(),
            };
            index
                .and_then(|index| {
                    let path = reader.source_file(die, index)?;
                    Some(format!("[{}] {}", index, path))
                })
                .unwrap_or_else(|| numeric_string(value))
        }
        gimli::DW_AT_language => symbols::language_string(code),
        gimli::DW_AT_accessibility => symbols::accessibility_string(code),
        gimli::DW_AT_encoding => symbols::encoding_string(code),
        gimli::DW_AT_calling_convention => symbols::calling_convention_string(code),
        gimli::DW_AT_decimal_sign => symbols::decimal_sign_string(code),
        gimli::DW_AT_discr_value => symbols::discriminant_string(code),
        gimli::DW_AT_identifier_case => symbols::identifier_case_string(code),
        gimli::DW_AT_endianity => symbols::endianity_string(code),
        gimli::DW_AT_inline => symbols::inline_string(code),
        gimli::DW_AT_ordering => symbols::ordering_string(code),
        gimli::DW_AT_virtuality => symbols::virtuality_string(code),
        gimli::DW_AT_visibility => symbols::visibility_string(code),
        _ => numeric_string(value),
    }
}

/// Decimal when signed or below 0x10000, hex otherwise.
fn numeric_string(value: Constant) -> String {
    match value {
        Constant::Signed(value) => value.to_string(),
        Constant::Unsigned(value) if value < 0x10000 => value.to_string(),
        Constant::Unsigned(value) => format!("{:#x}", value),
    }
}
