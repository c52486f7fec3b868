//! Display names for DWARF codes.
//!
//! Names come from gimli's constant tables with the `DW_<SET>_` prefix
//! stripped, so `DW_TAG_structure_type` shows as `structure_type`. Every
//! table has a `*_string` twin that falls back to the raw code in hex.

macro_rules! symbol_tables {
    ($($name:ident, $string:ident => $ty:ident, $prefix:literal;)*) => {
        $(
            pub fn $name(code: u64) -> Option<&'static str> {
                let code = gimli::$ty(code.try_into().ok()?);
                code.static_string()?.strip_prefix($prefix)
            }

            pub fn $string(code: u64) -> String {
                $name(code).map_or_else(|| hex(code), str::to_owned)
            }
        )*
    };
}

symbol_tables! {
    tag_name, tag_string => DwTag, "DW_TAG_";
    attribute_name, attribute_string => DwAt, "DW_AT_";
    form_name, form_string => DwForm, "DW_FORM_";
    language_name, language_string => DwLang, "DW_LANG_";
    accessibility_name, accessibility_string => DwAccess, "DW_ACCESS_";
    encoding_name, encoding_string => DwAte, "DW_ATE_";
    calling_convention_name, calling_convention_string => DwCc, "DW_CC_";
    decimal_sign_name, decimal_sign_string => DwDs, "DW_DS_";
    discriminant_name, discriminant_string => DwDsc, "DW_DSC_";
    identifier_case_name, identifier_case_string => DwId, "DW_ID_";
    endianity_name, endianity_string => DwEnd, "DW_END_";
    inline_name, inline_string => DwInl, "DW_INL_";
    ordering_name, ordering_string => DwOrd, "DW_ORD_";
    virtuality_name, virtuality_string => DwVirtuality, "DW_VIRTUALITY_";
    visibility_name, visibility_string => DwVis, "DW_VIS_";
}

pub fn hex(code: u64) -> String {
    format!("{:#x}", code)
}
