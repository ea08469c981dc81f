use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("empty size")]
    Empty,
    #[error("invalid size {0:?}: expected a number, 0x-prefixed hex, or a K/M/G multiple")]
    Invalid(String),
    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// A byte count. Parses from `65536`, `0x10000`, `64K`, `256M` or `1G`, and displays in the
/// largest unit that divides it exactly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "RawSize")]
pub struct Size(pub u64);

impl Size {
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for Size {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SizeError::Empty);
        }
        let invalid = || SizeError::Invalid(s.to_string());

        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let digits: String = hex.chars().filter(|&c| c != '_').collect();
            return u64::from_str_radix(&digits, 16)
                .map(Size)
                .map_err(|_| invalid());
        }

        let (number, multiplier) = match trimmed.char_indices().last() {
            Some((i, 'K' | 'k')) => (&trimmed[..i], KIB),
            Some((i, 'M' | 'm')) => (&trimmed[..i], MIB),
            Some((i, 'G' | 'g')) => (&trimmed[..i], GIB),
            _ => (trimmed, 1),
        };
        let digits: String = number.trim().chars().filter(|&c| c != '_').collect();
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        value
            .checked_mul(multiplier)
            .map(Size)
            .ok_or_else(|| SizeError::Overflow(s.to_string()))
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0;
        if bytes >= GIB && bytes % GIB == 0 {
            write!(f, "{}G", bytes / GIB)
        } else if bytes >= MIB && bytes % MIB == 0 {
            write!(f, "{}M", bytes / MIB)
        } else if bytes >= KIB && bytes % KIB == 0 {
            write!(f, "{}K", bytes / KIB)
        } else {
            write!(f, "{bytes}")
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Int(u64),
    Str(String),
}
impl TryFrom<RawSize> for Size {
    type Error = SizeError;

    fn try_from(raw: RawSize) -> Result<Self, Self::Error> {
        match raw {
            RawSize::Int(n) => Ok(Size(n)),
            RawSize::Str(s) => s.parse(),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid region attribute {0:?}: expected some of `r`, `w`, `x`")]
pub struct AttributeError(char);

/// Access attributes of a `MEMORY` region, as written between the parentheses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Attributes {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Attributes {
    pub const RX: Self = Self {
        read: true,
        write: false,
        execute: true,
    };
    pub const RWX: Self = Self {
        read: true,
        write: true,
        execute: true,
    };
}

impl FromStr for Attributes {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attributes = Attributes::default();
        for c in s.trim().chars() {
            match c.to_ascii_lowercase() {
                'r' => attributes.read = true,
                'w' => attributes.write = true,
                'x' => attributes.execute = true,
                other => return Err(AttributeError(other)),
            }
        }
        Ok(attributes)
    }
}
impl TryFrom<String> for Attributes {
    type Error = AttributeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.read {
            f.write_str("r")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        if self.execute {
            f.write_str("x")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("region {0} has zero length")]
    Empty(String),
    #[error(
        "region {name} at {origin:#010x} with length {length:#x} \
         runs past the end of the address space"
    )]
    Overflow {
        name: String,
        origin: u64,
        length: u64,
    },
}

/// A named address range, as declared in a linker `MEMORY` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryRegion {
    name: String,
    origin: u64,
    length: u64,
    attributes: Attributes,
}

impl MemoryRegion {
    pub fn new(
        name: impl Into<String>,
        origin: u64,
        length: u64,
        attributes: Attributes,
    ) -> Result<Self, RegionError> {
        let name = name.into();
        if length == 0 {
            return Err(RegionError::Empty(name));
        }
        if origin.checked_add(length).is_none() {
            return Err(RegionError::Overflow {
                name,
                origin,
                length,
            });
        }
        Ok(Self {
            name,
            origin,
            length,
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn origin(&self) -> u64 {
        self.origin
    }
    pub fn length(&self) -> u64 {
        self.length
    }
    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    /// One past the last address; cannot overflow, `new` rejects such regions.
    pub fn end(&self) -> u64 {
        self.origin + self.length
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.origin && address < self.end()
    }

    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        self.origin < other.end() && other.origin < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_parse() {
        assert_eq!("65536".parse(), Ok(Size(65536)));
        assert_eq!("0x20000".parse(), Ok(Size(0x20000)));
        assert_eq!("0x8000_0000".parse(), Ok(Size(0x8000_0000)));
        assert_eq!("64K".parse(), Ok(Size(64 * 1024)));
        assert_eq!("16k".parse(), Ok(Size(16 * 1024)));
        assert_eq!("256M".parse(), Ok(Size(256 * 1024 * 1024)));
        assert_eq!(" 1G ".parse(), Ok(Size(1 << 30)));
        assert_eq!("".parse::<Size>(), Err(SizeError::Empty));
        assert!(matches!("12Q".parse::<Size>(), Err(SizeError::Invalid(_))));
        assert!(matches!("K".parse::<Size>(), Err(SizeError::Invalid(_))));
        assert!(matches!(
            "99999999999999999G".parse::<Size>(),
            Err(SizeError::Overflow(_))
        ));
    }

    #[test]
    fn test_size_display() {
        assert_eq!(Size(128 * 1024 * 1024).to_string(), "128M");
        assert_eq!(Size(2 << 30).to_string(), "2G");
        assert_eq!(Size(16 * 1024).to_string(), "16K");
        assert_eq!(Size(1536 * 1024).to_string(), "1536K");
        assert_eq!(Size(1000).to_string(), "1000");
        assert_eq!(Size(0).to_string(), "0");
    }

    #[test]
    fn test_attributes() {
        assert_eq!("rx".parse(), Ok(Attributes::RX));
        assert_eq!("RWX".parse(), Ok(Attributes::RWX));
        assert_eq!(Attributes::RWX.to_string(), "rwx");
        assert_eq!("rq".parse::<Attributes>(), Err(AttributeError('q')));
    }

    #[test]
    fn test_region_bounds() {
        let ram = MemoryRegion::new("RAM", 0x1000, 0x1000, Attributes::RWX).unwrap();
        assert_eq!(ram.end(), 0x2000);
        assert!(ram.contains(0x1000));
        assert!(ram.contains(0x1fff));
        assert!(!ram.contains(0x2000));

        let other = MemoryRegion::new("RAM2", 0x1fff, 0x10, Attributes::RWX).unwrap();
        assert!(ram.overlaps(&other));
        let disjoint = MemoryRegion::new("RAM3", 0x2000, 0x10, Attributes::RWX).unwrap();
        assert!(!ram.overlaps(&disjoint));

        assert_eq!(
            MemoryRegion::new("RAM", 0, 0, Attributes::RWX),
            Err(RegionError::Empty("RAM".to_string()))
        );
        assert!(matches!(
            MemoryRegion::new("RAM", u64::MAX, 1, Attributes::RWX),
            Err(RegionError::Overflow { .. })
        ));
    }
}
