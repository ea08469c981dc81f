//! Boot region layout for riscv-rt firmware on the AE350 SoC.
//!
//! The layout puts a fixed `.bootloader` section at the very start of FLASH, so that the reset
//! vector lands in application bootstrap code, and leaves everything else to the runtime through
//! `REGION_*` aliases. The same crate also turns Andes SAG files into GNU LD scripts.

/// Build-script helpers that write linker scripts into `OUT_DIR`.
pub mod build;
/// TOML board descriptions and built-in presets.
pub mod board;
/// Layout resolution and the symbols handed to startup code.
pub mod layout;
/// Memory regions and sizes.
pub mod region;
/// Andes SAG parsing and GNU LD emission.
pub mod sag;
/// `memory.x` emission.
pub mod script;
/// Section kinds and the region aliases they are placed through.
pub mod section;

pub use board::{Board, BoardError};
pub use layout::{
    BootLayout, Footprint, LayoutConfig, LayoutError, Placement, ResolvedLayout, Symbols,
};
pub use region::{Attributes, MemoryRegion, RegionError, Size, SizeError};
pub use sag::{SagError, SagFile};
pub use section::{RegionAlias, RegionRole, SectionKind};

/// Heap reservation handed to riscv-rt as `_heap_size`.
pub const DEFAULT_HEAP_SIZE: u64 = 64 * 1024;

/// Per-hart stack reservation handed to riscv-rt as `_hart_stack_size`.
pub const DEFAULT_HART_STACK_SIZE: u64 = 16 * 1024;

/// Highest hart id; the AE350 is a single-hart target.
pub const DEFAULT_MAX_HART_ID: u32 = 0;

/// Input section name collected into the first bytes of FLASH.
pub const BOOTLOADER_SECTION: &str = ".bootloader";
