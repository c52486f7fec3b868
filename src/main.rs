use clap::{Parser, Subcommand};

use miette::{Result, WrapErr};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod attrs;
mod config;
mod error;
mod image;
mod locate;
mod navigate;
mod reader;
mod symbols;
#[cfg(test)]
mod testing;
mod tree;
mod typename;
mod value;

use crate::attrs::AttrRow;
use crate::config::Options;
use crate::error::{span_of, Error};
use crate::image::{Files, Image};
use crate::locate::Target;
use crate::reader::{DieId, DwarfReader, UnitSpace};
use crate::tree::{DieTree, NodeId, NodeState};

#[derive(Parser, Debug)]
#[clap(version)]
/// Browse the DWARF debugging information of ELF files and kernels
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
struct TreeArgs {
    #[clap(flatten)]
    target: Target,
    /// Walk the type units of .debug_types instead of .debug_info
    #[clap(long)]
    types: bool,
    /// How many levels below each unit to expand
    #[clap(short, long, default_value = "1")]
    depth: usize,
    #[clap(flatten)]
    options: Options,
}

#[derive(Parser, Debug)]
struct AttrsArgs {
    /// Hex offset of the DIE
    offset: String,
    #[clap(flatten)]
    target: Target,
    /// The offset is in .debug_types
    #[clap(long)]
    types: bool,
    #[clap(flatten)]
    options: Options,
}

#[derive(Parser, Debug)]
struct FollowArgs {
    /// Hex offset of the DIE
    offset: String,
    /// The reference attribute to follow, such as `type` or `DW_AT_type`
    attribute: String,
    #[clap(flatten)]
    target: Target,
    /// The offset is in .debug_types
    #[clap(long)]
    types: bool,
    #[clap(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the units and their DIEs
    Tree(TreeArgs),
    /// Print the attributes of a DIE, with referenced DIEs nested below
    Attrs(AttrsArgs),
    /// Follow a reference attribute of a DIE and print where it leads
    Follow(FollowArgs),
}

fn space(types: bool) -> UnitSpace {
    if types {
        UnitSpace::Types
    } else {
        UnitSpace::Info
    }
}

fn parse_offset(input: &str) -> Result<u64, Error> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    u64::from_str_radix(digits, 16).map_err(|_| Error::BadOffset {
        input: input.to_string(),
        span: span_of(input),
    })
}

fn open(target: &Target) -> Result<Image> {
    let path = target.resolve()?;
    tracing::debug!("opening {}", path.display());
    Image::open(&path, target.alt.as_deref())
        .wrap_err_with(|| format!("Could not open {}", path.display()))
}

fn row_text(tree: &DieTree, node: NodeId) -> String {
    let row = match tree.row(node) {
        Some(row) => row,
        None => return "...".to_string(),
    };
    let more = if tree.state(node) == NodeState::Unexpanded {
        " +"
    } else {
        ""
    };
    format!(
        "{:>8} {:<24} {}{}",
        row.offset,
        row.tag,
        row.name.as_deref().unwrap_or(""),
        more
    )
}

fn branches(last: bool) -> (&'static str, &'static str) {
    if last {
        ("└─ ", "   ")
    } else {
        ("├─ ", "│  ")
    }
}

fn print_node(
    tree: &mut DieTree,
    reader: &dyn DwarfReader,
    node: NodeId,
    lead: &str,
    rest: &str,
    depth: usize,
) {
    if depth > 0 {
        tree.open(reader, node);
    }
    println!("{}{}", lead, row_text(tree, node));
    if depth == 0 || !tree.is_open(node) {
        return;
    }
    for n in 0..tree.n_children(Some(node)) {
        let child = match tree.nth_child(Some(node), n) {
            Some(child) => child,
            None => break,
        };
        let (branch, more) = branches(tree.next_sibling(child).is_none());
        print_node(
            tree,
            reader,
            child,
            &format!("{}{}", rest, branch),
            &format!("{}{}", rest, more),
            depth - 1,
        );
    }
}

fn print_files(files: &Files) {
    println!("main  {}", files.main.display());
    if let Some(debug) = &files.debug {
        println!("debug {}", debug.display());
    }
    if let Some(alt) = &files.alt {
        println!("alt   {}", alt.display());
    }
}

fn print_tree(args: TreeArgs) -> Result<()> {
    let image = open(&args.target)?;
    print_files(image.files());
    let dwarf = image.dwarf()?;
    let mut tree = DieTree::build(&dwarf, space(args.types), args.options);
    for n in 0..tree.n_children(None) {
        if let Some(root) = tree.nth_child(None, n) {
            print_node(&mut tree, &dwarf, root, "", "", args.depth);
        }
    }
    Ok(())
}

fn print_rows(rows: &[AttrRow], prefix: &str) {
    for (i, row) in rows.iter().enumerate() {
        let (branch, more) = branches(i + 1 == rows.len());
        println!(
            "{}{}{:<24} {:<16} {}",
            prefix,
            branch,
            row.name,
            row.form,
            row.value.as_deref().unwrap_or("")
        );
        print_rows(&row.children, &format!("{}{}", prefix, more));
    }
}

fn print_attrs(args: AttrsArgs) -> Result<()> {
    let offset = parse_offset(&args.offset)?;
    let image = open(&args.target)?;
    let dwarf = image.dwarf()?;
    let die = DieId::new(space(args.types).section(), offset);
    if dwarf.tag(die).is_none() {
        return Err(Error::DieNotFound(offset).into());
    }
    let rows = attrs::attribute_tree(&dwarf, die, &args.options);
    print_rows(&rows, "");
    Ok(())
}

fn print_path(tree: &DieTree, node: NodeId) {
    let path = tree.path(node);
    for depth in 1..=path.len() {
        let node = match tree.node_at(&path[..depth]) {
            Some(node) => node,
            None => break,
        };
        let lead = match depth {
            1 => String::new(),
            depth => format!("{}└─ ", "   ".repeat(depth - 2)),
        };
        println!("{}{}", lead, row_text(tree, node));
    }
}

fn follow(args: FollowArgs) -> Result<()> {
    let offset = parse_offset(&args.offset)?;
    let image = open(&args.target)?;
    let dwarf = image.dwarf()?;
    let space = space(args.types);
    let die = DieId::new(space.section(), offset);
    if dwarf.tag(die).is_none() {
        return Err(Error::DieNotFound(offset).into());
    }
    let mut tree = DieTree::build(&dwarf, space, args.options);
    if navigate::reveal(&mut tree, &dwarf, die).is_none() {
        return Err(Error::DieHidden(offset).into());
    }

    let wanted = args.attribute.strip_prefix("DW_AT_").unwrap_or(&args.attribute);
    let rows = attrs::attribute_tree(&dwarf, die, &args.options);
    let input = args.attribute.clone();
    let row = match rows.iter().find(|row| row.name == wanted) {
        Some(row) => row,
        None => {
            let span = span_of(&input);
            if attrs::is_hidden(&dwarf, die, wanted, &args.options) {
                let name = wanted.to_string();
                return Err(Error::AttributeHidden { input, span, name }.into());
            }
            let err = match attrs::closest_attribute(&dwarf, die, wanted, &args.options) {
                Some(suggestion) => Error::AttributeMissing {
                    input,
                    span,
                    name: wanted.to_string(),
                    suggestion,
                },
                None => Error::NoAttributes { input, span },
            };
            return Err(err.into());
        }
    };
    let target = row.target().ok_or_else(|| Error::NotAReference {
        span: span_of(&input),
        input: input.clone(),
        name: row.name.clone(),
        value: row.value.clone().unwrap_or_default(),
    })?;
    if let Some(node) = navigate::navigate(&mut tree, &dwarf, target) {
        print_path(&tree, node);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    let cli = Cli::parse();
    use Command::*;
    match cli.command {
        Tree(args) => print_tree(args),
        Attrs(args) => print_attrs(args),
        Follow(args) => follow(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn offsets_are_hex() {
        assert_eq!(parse_offset("2d").unwrap(), 0x2d);
        assert_eq!(parse_offset("0x2D").unwrap(), 0x2d);
        assert!(matches!(parse_offset("zz"), Err(Error::BadOffset { .. })));
        assert!(matches!(parse_offset(""), Err(Error::BadOffset { .. })));
    }

    #[test]
    fn follow_takes_offset_and_attribute_before_the_file() {
        let args = ["dieview", "follow", "2d", "type", "a.out", "--explicit-imports"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Follow(args) => {
                assert_eq!(args.offset, "2d");
                assert_eq!(args.attribute, "type");
                assert_eq!(args.target.file, Some("a.out".into()));
                assert!(args.options.explicit_imports);
            }
            command => panic!("parsed as {:?}", command),
        }
    }

    #[test]
    fn kernel_release_is_optional() {
        let cli = Cli::try_parse_from(["dieview", "tree", "--kernel"]).unwrap();
        match cli.command {
            Command::Tree(args) => {
                assert_eq!(args.target.kernel, Some(None));
                assert_eq!(args.depth, 1);
            }
            command => panic!("parsed as {:?}", command),
        }
    }
}
