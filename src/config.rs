use clap::Args;

/// Per-session display toggles.
///
/// Read when a tree is built and when an attribute subtree is expanded;
/// changing them afterwards needs a fresh tree.
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Show partial units and imported_unit DIEs instead of substituting them
    #[clap(long)]
    pub explicit_imports: bool,
    /// Show DW_AT_sibling attributes
    #[clap(long)]
    pub explicit_siblings: bool,
}
