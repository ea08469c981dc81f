//! Andes SAG layout files.
//!
//! A SAG file is a list of blocks, each with a load address, holding regions with a run address.
//! Regions list directives: symbol definitions (`ADDR`, `LOADADDR`), the stack pointer
//! (`STACK = ...`), and input section patterns (`* KEEP ( .bootloader )`, `* ( +RO )`).
//!
//! ```txt
//! USER_SECTIONS .bootloader
//!
//! HEAD 0x80000000
//! {
//!     BOOTLOADER 0x80000000
//!     {
//!         ADDR __flash_start
//!         * KEEP ( .bootloader )
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Turns a [`SagFile`] into a GNU LD script.
mod emit;
/// Line-oriented parser.
mod parse;

#[derive(Debug, Error)]
pub enum SagError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("address {base:#x}{offset:+} is out of range")]
    AddressOutOfRange { base: u64, offset: i64 },
}

/// An absolute address, or an offset from the previous one (`+0`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Address {
    Absolute(u64),
    Relative(i64),
}

impl Address {
    pub fn resolve(self, base: u64) -> Result<u64, SagError> {
        match self {
            Address::Absolute(address) => Ok(address),
            Address::Relative(offset) => base
                .checked_add_signed(offset)
                .ok_or(SagError::AddressOutOfRange { base, offset }),
        }
    }
}

impl FromStr for Address {
    type Err = SagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SagError::InvalidAddress(s.to_string());
        if let Some(offset) = s.strip_prefix('+') {
            offset.trim().parse().map(Address::Relative).map_err(|_| invalid())
        } else if s.starts_with('-') {
            s.parse().map(Address::Relative).map_err(|_| invalid())
        } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
                .map(Address::Absolute)
                .map_err(|_| invalid())
        } else {
            s.parse().map(Address::Absolute).map_err(|_| invalid())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `ADDR [NEXT] symbol`: run address of the following section, or with `NEXT` the end of the
    /// preceding one.
    Addr { symbol: String, next: bool },
    /// `LOADADDR [NEXT] symbol`: same as `Addr`, for load addresses.
    LoadAddr { symbol: String, next: bool },
    /// `* [KEEP] ( patterns )`
    Section { pattern: String, keep: bool },
    /// `STACK = address`
    Stack(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub vma: Address,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Head,
    Mem,
    LdSection,
    Exec,
    Data,
}

impl BlockKind {
    pub const ALL: [BlockKind; 5] = [
        BlockKind::Head,
        BlockKind::Mem,
        BlockKind::LdSection,
        BlockKind::Exec,
        BlockKind::Data,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            BlockKind::Head => "HEAD",
            BlockKind::Mem => "MEM",
            BlockKind::LdSection => "LDSECTION",
            BlockKind::Exec => "EXEC",
            BlockKind::Data => "DATA",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub lma: Address,
    pub alignment: Option<u64>,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SagFile {
    pub user_sections: Vec<String>,
    pub blocks: Vec<Block>,
}

impl SagFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SagError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// The first `STACK = ...` value, if any.
    pub fn stack(&self) -> Option<u64> {
        self.directives().find_map(|directive| match directive {
            Directive::Stack(address) => Some(*address),
            _ => None,
        })
    }

    fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.blocks
            .iter()
            .flat_map(|block| &block.regions)
            .flat_map(|region| &region.directives)
    }
}

impl FromStr for SagFile {
    type Err = SagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::Parser::new(s).parse()
    }
}

/// Expands a `* ( ... )` pattern into output section names (without the leading dot).
pub fn expand_section_pattern(pattern: &str) -> Vec<String> {
    let mut sections = Vec::new();
    for part in pattern.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part {
            "+ISR" => sections.extend(["vectors", "isr"].map(String::from)),
            "+RO" => sections.extend(["text", "rodata", "srodata"].map(String::from)),
            "+RW" => sections.extend(["data", "sdata"].map(String::from)),
            "+ZI" => sections.extend(["bss", "sbss"].map(String::from)),
            s => sections.push(s.strip_prefix('.').unwrap_or(s).to_string()),
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!("0x80000000".parse::<Address>().unwrap(), Address::Absolute(0x8000_0000));
        assert_eq!("4096".parse::<Address>().unwrap(), Address::Absolute(4096));
        assert_eq!("+0".parse::<Address>().unwrap(), Address::Relative(0));
        assert_eq!("+256".parse::<Address>().unwrap(), Address::Relative(256));
        assert_eq!("-16".parse::<Address>().unwrap(), Address::Relative(-16));
        assert!(matches!(
            "0xZZ".parse::<Address>(),
            Err(SagError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_resolve_address() {
        assert_eq!(Address::Relative(16).resolve(0x100).unwrap(), 0x110);
        assert_eq!(Address::Relative(-16).resolve(0x100).unwrap(), 0xf0);
        assert_eq!(Address::Absolute(8).resolve(0x100).unwrap(), 8);
        assert!(matches!(
            Address::Relative(-1).resolve(0),
            Err(SagError::AddressOutOfRange { base: 0, offset: -1 })
        ));
    }

    #[test]
    fn test_expand_section_pattern() {
        assert_eq!(expand_section_pattern("+ISR , +RO"), [
            "vectors", "isr", "text", "rodata", "srodata"
        ]);
        assert_eq!(expand_section_pattern("+RW, +ZI"), ["data", "sdata", "bss", "sbss"]);
        assert_eq!(expand_section_pattern(".bootloader"), ["bootloader"]);
        assert_eq!(expand_section_pattern("nds_vector"), ["nds_vector"]);
    }
}
