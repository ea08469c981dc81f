//! A board is the external memory map: a list of regions, which of them play the FLASH and RAM
//! roles, and optional overrides for the layout reservations.
//!
//! ```toml
//! name = "AE350 DDR"
//! ram = "DDR"
//!
//! [[region]]
//! name = "FLASH"
//! origin = 0x80000000
//! length = "256M"
//! attributes = "rx"
//!
//! [[region]]
//! name = "DDR"
//! origin = 0x00000000
//! length = "128M"
//! attributes = "rwx"
//!
//! [layout]
//! heap-size = "64K"
//! max-hart-id = 0
//!
//! # checked against FLASH and RAM; omitted sizes count as zero
//! [layout.footprint]
//! bootloader = "4K"
//! text = "96K"
//! ```

use crate::layout::{BootLayout, Footprint, LayoutConfig, LayoutError, ResolvedLayout};
use crate::region::{Attributes, MemoryRegion, RegionError, Size};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed board description: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("region {0} is declared more than once")]
    DuplicateRegion(String),
    #[error("{role} region {name} is not declared")]
    UnknownRegion { role: &'static str, name: String },
    #[error("unknown preset {0:?}; expected one of: ddr, ilm")]
    UnknownPreset(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BoardFile {
    name: Option<String>,
    #[serde(default = "default_flash")]
    flash: String,
    #[serde(default = "default_ram")]
    ram: String,
    #[serde(rename = "region", default)]
    regions: Vec<RegionEntry>,
    #[serde(default)]
    layout: LayoutTable,
}
fn default_flash() -> String {
    "FLASH".to_string()
}
fn default_ram() -> String {
    "RAM".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionEntry {
    name: String,
    // addresses take the same syntax as sizes
    origin: Size,
    length: Size,
    #[serde(default = "default_attributes")]
    attributes: Attributes,
}
fn default_attributes() -> Attributes {
    Attributes::RWX
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct LayoutTable {
    heap_size: Option<Size>,
    hart_stack_size: Option<Size>,
    max_hart_id: Option<u32>,
    #[serde(default)]
    footprint: FootprintTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FootprintTable {
    bootloader: Option<Size>,
    text: Option<Size>,
    rodata: Option<Size>,
    data: Option<Size>,
    bss: Option<Size>,
}

impl From<FootprintTable> for Footprint {
    fn from(table: FootprintTable) -> Self {
        let bytes = |size: Option<Size>| size.map_or(0, Size::bytes);
        Footprint {
            bootloader: bytes(table.bootloader),
            text: bytes(table.text),
            rodata: bytes(table.rodata),
            data: bytes(table.data),
            bss: bytes(table.bss),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    name: String,
    regions: Vec<MemoryRegion>,
    flash: String,
    ram: String,
    config: LayoutConfig,
}

impl Board {
    pub fn new(
        name: impl Into<String>,
        regions: Vec<MemoryRegion>,
        flash: impl Into<String>,
        ram: impl Into<String>,
    ) -> Result<Self, BoardError> {
        let board = Self {
            name: name.into(),
            regions,
            flash: flash.into(),
            ram: ram.into(),
            config: LayoutConfig::default(),
        };
        for (i, region) in board.regions.iter().enumerate() {
            if board.regions[..i].iter().any(|r| r.name() == region.name()) {
                return Err(BoardError::DuplicateRegion(region.name().to_string()));
            }
        }
        board.flash_region()?;
        board.ram_region()?;
        Ok(board)
    }

    /// AE350 running from DDR: XIP flash at `0x8000_0000`, 128M of DDR at zero.
    pub fn ae350_ddr() -> Self {
        Self::preset_unchecked(
            "AE350 DDR",
            [
                ("FLASH", 0x8000_0000, 256 * MIB, Attributes::RX),
                ("DDR", 0x0000_0000, 128 * MIB, Attributes::RWX),
            ],
            "DDR",
        )
    }

    /// AE350 running from the 2M instruction local memory.
    pub fn ae350_ilm() -> Self {
        Self::preset_unchecked(
            "AE350 ILM",
            [
                ("FLASH", 0x8000_0000, 256 * MIB, Attributes::RX),
                ("ILM", 0xA000_0000, 2 * MIB, Attributes::RWX),
            ],
            "ILM",
        )
    }

    fn preset_unchecked(
        name: &str,
        regions: [(&str, u64, u64, Attributes); 2],
        ram: &str,
    ) -> Self {
        let regions = regions
            .into_iter()
            .map(|(name, origin, length, attributes)| {
                MemoryRegion::new(name, origin, length, attributes)
                    .unwrap_or_else(|e| unreachable!("preset region {name} is invalid: {e}"))
            })
            .collect();
        Self {
            name: name.to_string(),
            regions,
            flash: "FLASH".to_string(),
            ram: ram.to_string(),
            config: LayoutConfig::default(),
        }
    }

    pub fn preset(name: &str) -> Result<Self, BoardError> {
        match name.to_ascii_lowercase().as_str() {
            "ddr" => Ok(Self::ae350_ddr()),
            "ilm" => Ok(Self::ae350_ilm()),
            _ => Err(BoardError::UnknownPreset(name.to_string())),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BoardError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| BoardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut board: Board = content.parse()?;
        if board.name.is_empty() {
            board.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        tracing::debug!("loaded board {:?} from {}", board.name, path.display());
        Ok(board)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn with_config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name() == name)
    }

    /// First declared region containing `address`.
    pub fn region_for(&self, address: u64) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.contains(address))
    }

    pub fn flash_region(&self) -> Result<&MemoryRegion, BoardError> {
        self.region(&self.flash)
            .ok_or_else(|| BoardError::UnknownRegion {
                role: "FLASH",
                name: self.flash.clone(),
            })
    }

    pub fn ram_region(&self) -> Result<&MemoryRegion, BoardError> {
        self.region(&self.ram).ok_or_else(|| BoardError::UnknownRegion {
            role: "RAM",
            name: self.ram.clone(),
        })
    }

    pub fn layout(&self) -> Result<BootLayout, BoardError> {
        Ok(BootLayout::new(
            self.flash_region()?.clone(),
            self.ram_region()?.clone(),
        )?)
    }

    pub fn resolve(&self) -> Result<ResolvedLayout, BoardError> {
        Ok(self.layout()?.resolve(&self.config)?)
    }
}

impl FromStr for Board {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let file: BoardFile = toml::from_str(s)?;
        let regions = file
            .regions
            .into_iter()
            .map(|entry| {
                MemoryRegion::new(
                    entry.name,
                    entry.origin.bytes(),
                    entry.length.bytes(),
                    entry.attributes,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut config = LayoutConfig::default();
        if let Some(heap_size) = file.layout.heap_size {
            config.heap_size = heap_size.bytes();
        }
        if let Some(hart_stack_size) = file.layout.hart_stack_size {
            config.hart_stack_size = hart_stack_size.bytes();
        }
        if let Some(max_hart_id) = file.layout.max_hart_id {
            config.max_hart_id = max_hart_id;
        }
        config.footprint = file.layout.footprint.into();

        let board = Board::new(file.name.unwrap_or_default(), regions, file.flash, file.ram)?;
        Ok(board.with_config(config))
    }
}
