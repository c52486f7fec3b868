//! C-like type names rebuilt from chains of type DIEs.

use gimli::DwTag;

use crate::reader::{DieId, DwarfReader};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TypeKind {
    /// Base types and typedefs end the chain with their own name
    Named,
    /// Aggregates end the chain with a keyword and a name
    Aggregate(&'static str),
    /// Modifiers add a suffix and continue to their own type
    Modifier(&'static str),
    /// Function types put the modifiers between return and parameters
    Subroutine,
    Other,
}

impl From<DwTag> for TypeKind {
    fn from(tag: DwTag) -> Self {
        match tag {
            gimli::DW_TAG_base_type | gimli::DW_TAG_typedef => Self::Named,
            gimli::DW_TAG_class_type => Self::Aggregate("class"),
            gimli::DW_TAG_enumeration_type => Self::Aggregate("enum"),
            gimli::DW_TAG_structure_type => Self::Aggregate("struct"),
            gimli::DW_TAG_union_type => Self::Aggregate("union"),
            gimli::DW_TAG_array_type => Self::Modifier("[]"),
            gimli::DW_TAG_const_type => Self::Modifier(" const"),
            gimli::DW_TAG_pointer_type => Self::Modifier("*"),
            gimli::DW_TAG_reference_type => Self::Modifier("&"),
            gimli::DW_TAG_rvalue_reference_type => Self::Modifier("&&"),
            gimli::DW_TAG_volatile_type => Self::Modifier(" volatile"),
            gimli::DW_TAG_subroutine_type => Self::Subroutine,
            _ => Self::Other,
        }
    }
}

/// The type name of `die`, or `None` if `die` is not a type the walk
/// understands; callers fall back to the plain DW_AT_name.
pub fn type_name(reader: &dyn DwarfReader, die: DieId) -> Option<String> {
    type_name_on_path(reader, die, &mut Vec::new())
}

/// `path` holds every DIE on the active walk, including the enclosing
/// walks of return and parameter types. Meeting one again is a cycle.
fn type_name_on_path(
    reader: &dyn DwarfReader,
    die: DieId,
    path: &mut Vec<DieId>,
) -> Option<String> {
    let depth = path.len();
    let mut subroutine = None;
    let name = declarator(reader, die, &mut subroutine, path).map(|modifiers| match subroutine {
        Some(subroutine) => subroutine_name(reader, subroutine, &modifiers, path),
        None => modifiers,
    });
    path.truncate(depth);
    name
}

fn declarator(
    reader: &dyn DwarfReader,
    mut die: DieId,
    subroutine: &mut Option<DieId>,
    path: &mut Vec<DieId>,
) -> Option<String> {
    let mut suffixes = Vec::new();
    let mut name = loop {
        if path.contains(&die) {
            tracing::debug!("type chain cycles at DIE {:x}", die.offset);
            return None;
        }
        path.push(die);
        match TypeKind::from(reader.tag(die)?) {
            TypeKind::Named => break reader.name(die)?,
            TypeKind::Aggregate(keyword) => {
                let name = reader.name(die).unwrap_or_else(|| "{...}".to_string());
                break format!("{} {}", keyword, name);
            }
            TypeKind::Subroutine => {
                *subroutine = Some(die);
                break String::new();
            }
            TypeKind::Modifier(suffix) => suffixes.push(suffix),
            TypeKind::Other => return None,
        }
        match reader.attribute(die, gimli::DW_AT_type) {
            None => break "void".to_string(),
            Some(attr) => die = attr.reference()?,
        }
    };
    for suffix in suffixes.into_iter().rev() {
        name.push_str(suffix);
    }
    Some(name)
}

fn subroutine_name(
    reader: &dyn DwarfReader,
    subroutine: DieId,
    modifiers: &str,
    path: &mut Vec<DieId>,
) -> String {
    let ret = match reader.attribute(subroutine, gimli::DW_AT_type) {
        None => "void".to_string(),
        Some(attr) => attr
            .reference()
            .and_then(|ret| type_name_on_path(reader, ret, path))
            .unwrap_or_else(|| "?".to_string()),
    };
    let mut params = Vec::new();
    for child in reader.children(subroutine) {
        match reader.tag(child) {
            Some(gimli::DW_TAG_formal_parameter) => params.push(
                reader
                    .attribute(child, gimli::DW_AT_type)
                    .and_then(|attr| attr.reference())
                    .and_then(|param| type_name_on_path(reader, param, path))
                    .unwrap_or_else(|| "void".to_string()),
            ),
            Some(gimli::DW_TAG_unspecified_parameters) => params.push("...".to_string()),
            _ => {}
        }
    }
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    format!("{} ({})({})", ret, modifiers, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDwarf;

    fn base(dwarf: &mut FakeDwarf, cu: DieId, name: &str) -> DieId {
        dwarf.named(cu, gimli::DW_TAG_base_type, name)
    }

    #[test]
    fn base_and_typedef() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let int = base(&mut dwarf, cu, "int");
        let size_t = dwarf.named(cu, gimli::DW_TAG_typedef, "size_t");
        dwarf.type_of(size_t, int);
        assert_eq!(type_name(&dwarf, int).as_deref(), Some("int"));
        assert_eq!(type_name(&dwarf, size_t).as_deref(), Some("size_t"));
    }

    #[test]
    fn aggregates() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let foo = dwarf.named(cu, gimli::DW_TAG_structure_type, "foo");
        let anon = dwarf.die(cu, gimli::DW_TAG_union_type);
        let color = dwarf.named(cu, gimli::DW_TAG_enumeration_type, "color");
        let ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(foo));
        assert_eq!(type_name(&dwarf, foo).as_deref(), Some("struct foo"));
        assert_eq!(type_name(&dwarf, anon).as_deref(), Some("union {...}"));
        assert_eq!(type_name(&dwarf, color).as_deref(), Some("enum color"));
        assert_eq!(type_name(&dwarf, ptr).as_deref(), Some("struct foo*"));
    }

    #[test]
    fn modifiers_stack_outward() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let char_ = base(&mut dwarf, cu, "char");
        let konst = dwarf.modifier(cu, gimli::DW_TAG_const_type, Some(char_));
        let ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(konst));
        let volatile = dwarf.modifier(cu, gimli::DW_TAG_volatile_type, Some(ptr));
        let array = dwarf.modifier(cu, gimli::DW_TAG_array_type, Some(ptr));
        let rref = dwarf.modifier(cu, gimli::DW_TAG_rvalue_reference_type, Some(char_));
        let lref = dwarf.modifier(cu, gimli::DW_TAG_reference_type, Some(char_));
        assert_eq!(type_name(&dwarf, ptr).as_deref(), Some("char const*"));
        assert_eq!(type_name(&dwarf, volatile).as_deref(), Some("char const* volatile"));
        assert_eq!(type_name(&dwarf, array).as_deref(), Some("char const*[]"));
        assert_eq!(type_name(&dwarf, rref).as_deref(), Some("char&&"));
        assert_eq!(type_name(&dwarf, lref).as_deref(), Some("char&"));
    }

    #[test]
    fn untyped_modifier_is_void() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, None);
        assert_eq!(type_name(&dwarf, ptr).as_deref(), Some("void*"));
    }

    #[test]
    fn function_pointer() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let int = base(&mut dwarf, cu, "int");
        let char_ = base(&mut dwarf, cu, "char");
        let char_ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(char_));
        let func = dwarf.modifier(cu, gimli::DW_TAG_subroutine_type, Some(int));
        let param = dwarf.die(func, gimli::DW_TAG_formal_parameter);
        dwarf.type_of(param, char_ptr);
        dwarf.die(func, gimli::DW_TAG_unspecified_parameters);
        let ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(func));
        assert_eq!(type_name(&dwarf, ptr).as_deref(), Some("int (*)(char*, ...)"));
    }

    #[test]
    fn bare_subroutine_without_return_or_params() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let func = dwarf.die(cu, gimli::DW_TAG_subroutine_type);
        assert_eq!(type_name(&dwarf, func).as_deref(), Some("void ()(void)"));
    }

    #[test]
    fn function_returning_function_pointer() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let int = base(&mut dwarf, cu, "int");
        let inner = dwarf.modifier(cu, gimli::DW_TAG_subroutine_type, Some(int));
        let inner_ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(inner));
        let outer = dwarf.modifier(cu, gimli::DW_TAG_subroutine_type, Some(inner_ptr));
        let param = dwarf.die(outer, gimli::DW_TAG_formal_parameter);
        dwarf.type_of(param, int);
        let outer_ptr = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(outer));
        assert_eq!(
            type_name(&dwarf, outer_ptr).as_deref(),
            Some("int (*)(void) (*)(int)")
        );
    }

    #[test]
    fn unresolvable_parameter_and_return() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let missing = DieId::new(crate::reader::Section::Info, 0xdead);
        let func = dwarf.modifier(cu, gimli::DW_TAG_subroutine_type, Some(missing));
        let param = dwarf.die(func, gimli::DW_TAG_formal_parameter);
        dwarf.type_of(param, missing);
        dwarf.die(func, gimli::DW_TAG_formal_parameter);
        assert_eq!(type_name(&dwarf, func).as_deref(), Some("? ()(void, void)"));
    }

    #[test]
    fn non_types_have_no_type_name() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let var = dwarf.named(cu, gimli::DW_TAG_variable, "x");
        let missing = DieId::new(crate::reader::Section::Info, 0xdead);
        let dangling = dwarf.modifier(cu, gimli::DW_TAG_pointer_type, Some(missing));
        let unnamed = dwarf.die(cu, gimli::DW_TAG_base_type);
        assert_eq!(type_name(&dwarf, var), None);
        assert_eq!(type_name(&dwarf, dangling), None);
        assert_eq!(type_name(&dwarf, unnamed), None);
        assert_eq!(type_name(&dwarf, cu), None);
    }

    #[test]
    fn modifier_cycle_terminates() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let ptr = dwarf.die(cu, gimli::DW_TAG_pointer_type);
        let konst = dwarf.modifier(cu, gimli::DW_TAG_const_type, Some(ptr));
        dwarf.type_of(ptr, konst);
        assert_eq!(type_name(&dwarf, ptr), None);
    }

    #[test]
    fn self_referential_function_pointer_terminates() {
        let mut dwarf = FakeDwarf::new();
        let cu = dwarf.compile_unit("a.c");
        let int = base(&mut dwarf, cu, "int");
        let ptr = dwarf.die(cu, gimli::DW_TAG_pointer_type);
        let func = dwarf.modifier(cu, gimli::DW_TAG_subroutine_type, Some(int));
        let param = dwarf.die(func, gimli::DW_TAG_formal_parameter);
        dwarf.type_of(param, ptr);
        dwarf.type_of(ptr, func);
        assert_eq!(type_name(&dwarf, ptr).as_deref(), Some("int (*)(void)"));
    }
}
