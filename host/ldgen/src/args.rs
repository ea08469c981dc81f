use bootlayout::Size;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(clap::ValueEnum, Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Preset {
    /// XIP flash, application in DDR
    #[default]
    Ddr,
    /// XIP flash, application in the instruction local memory
    Ilm,
}
impl Display for Preset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Ddr => write!(f, "ddr"),
            Preset::Ilm => write!(f, "ilm"),
        }
    }
}

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase message verbosity
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence everything but errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a riscv-rt `memory.x` with the bootloader pinned to the start of FLASH
    Memory(MemoryArgs),
    /// Print the resolved placement and linker symbols
    Symbols(SymbolsArgs),
    /// Convert an Andes SAG file to a GNU LD script
    Sag(SagArgs),
}

/// Where the memory map comes from.
#[derive(clap::Args, Debug, Clone)]
pub struct BoardArgs {
    /// Board description (TOML); cannot be combined with --preset
    #[arg(short, long, conflicts_with = "preset")]
    pub board: Option<PathBuf>,

    /// Built-in board
    #[arg(short, long, default_value_t)]
    pub preset: Preset,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct LayoutArgs {
    /// Heap reservation, e.g. 64K or 0x10000
    #[arg(long)]
    pub heap_size: Option<Size>,

    /// Stack reservation per hart, e.g. 16K
    #[arg(long)]
    pub hart_stack_size: Option<Size>,

    /// Highest hart id
    #[arg(long, value_parser = clap_num::maybe_hex::<u32>)]
    pub max_hart_id: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MemoryArgs {
    #[command(flatten)]
    pub board: BoardArgs,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Output path; stdout if not given
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SymbolsArgs {
    #[command(flatten)]
    pub board: BoardArgs,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SagArgs {
    /// .sag file to convert
    #[arg(required = true)]
    pub input: PathBuf,

    #[command(flatten)]
    pub board: BoardArgs,

    /// Output path; stdout if not given
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the parsed SAG file instead of a linker script
    #[arg(long)]
    pub print_ast: bool,
}
