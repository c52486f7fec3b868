use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ObjectError(#[from] object::read::Error),
    #[error(transparent)]
    GimliError(#[from] gimli::Error),
    #[error("{0} has no .debug_info or .debug_types section")]
    #[diagnostic(help(
        "no separate debug file was found through its build id or .gnu_debuglink either"
    ))]
    NoDwarf(String),
    #[error("No DIE at offset {0:x}")]
    DieNotFound(u64),
    #[error("DIE {0:x} is not shown in the unit tree")]
    #[diagnostic(help("DIEs of partial units only show with --explicit-imports"))]
    DieHidden(u64),
    #[error("Bad DIE offset")]
    #[diagnostic(help("offsets are hexadecimal, with or without 0x"))]
    BadOffset {
        #[source_code]
        input: String,
        #[label("not a hex offset")]
        span: SourceSpan,
    },
    #[error("DIE has no attribute {name}")]
    #[diagnostic(help("consider replacing with {suggestion} instead"))]
    AttributeMissing {
        #[source_code]
        input: String,
        #[label("missing")]
        span: SourceSpan,
        name: String,
        suggestion: String,
    },
    #[error("DIE has a {name} attribute, but it is hidden")]
    #[diagnostic(help("sibling attributes only show with --explicit-siblings"))]
    AttributeHidden {
        #[source_code]
        input: String,
        #[label("hidden")]
        span: SourceSpan,
        name: String,
    },
    #[error("DIE has no attributes")]
    NoAttributes {
        #[source_code]
        input: String,
        #[label]
        span: SourceSpan,
    },
    #[error("{name} is not a reference")]
    NotAReference {
        #[source_code]
        input: String,
        #[label("holds {value}")]
        span: SourceSpan,
        name: String,
        value: String,
    },
    #[error("No kernel image found for release {0}")]
    #[diagnostic(help("install the kernel debug info package, or pass the vmlinux path"))]
    KernelNotFound(String),
    #[error("Kernel module {0} not found for release {1}")]
    ModuleNotFound(String, String),
    #[error("Nothing to open")]
    #[diagnostic(help("pass a FILE, --kernel or --module"))]
    NoTarget,
    #[error("A FILE cannot be combined with --kernel or --module")]
    TooManyTargets,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The whole of `text` as a label span.
pub fn span_of(text: &str) -> SourceSpan {
    (0, text.len()).into()
}
