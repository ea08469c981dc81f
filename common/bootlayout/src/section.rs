use std::fmt::{Display, Formatter};

/// Which of the two physical regions a section lives in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegionRole {
    Flash,
    Ram,
}

/// The `REGION_*` aliases riscv-rt's `link.x` places the standard sections through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegionAlias {
    Text,
    Rodata,
    Data,
    Bss,
    Heap,
    Stack,
}

impl RegionAlias {
    pub const ALL: [RegionAlias; 6] = [
        RegionAlias::Text,
        RegionAlias::Rodata,
        RegionAlias::Data,
        RegionAlias::Bss,
        RegionAlias::Heap,
        RegionAlias::Stack,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            RegionAlias::Text => "REGION_TEXT",
            RegionAlias::Rodata => "REGION_RODATA",
            RegionAlias::Data => "REGION_DATA",
            RegionAlias::Bss => "REGION_BSS",
            RegionAlias::Heap => "REGION_HEAP",
            RegionAlias::Stack => "REGION_STACK",
        }
    }

    /// Text and read-only data execute in place from FLASH; everything writable is in RAM.
    pub const fn role(self) -> RegionRole {
        match self {
            RegionAlias::Text | RegionAlias::Rodata => RegionRole::Flash,
            RegionAlias::Data | RegionAlias::Bss | RegionAlias::Heap | RegionAlias::Stack => {
                RegionRole::Ram
            }
        }
    }
}

impl Display for RegionAlias {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output sections of a firmware image, in placement order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Bootloader,
    Text,
    Rodata,
    Data,
    Bss,
    Heap,
    Stack,
}

impl SectionKind {
    pub const PLACEMENT_ORDER: [SectionKind; 7] = [
        SectionKind::Bootloader,
        SectionKind::Text,
        SectionKind::Rodata,
        SectionKind::Data,
        SectionKind::Bss,
        SectionKind::Heap,
        SectionKind::Stack,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            SectionKind::Bootloader => ".bootloader",
            SectionKind::Text => ".text",
            SectionKind::Rodata => ".rodata",
            SectionKind::Data => ".data",
            SectionKind::Bss => ".bss",
            SectionKind::Heap => ".heap",
            SectionKind::Stack => ".stack",
        }
    }

    /// The alias the runtime places this section through. The bootloader has none: it is pinned
    /// to `ORIGIN(FLASH)` directly.
    pub const fn alias(self) -> Option<RegionAlias> {
        match self {
            SectionKind::Bootloader => None,
            SectionKind::Text => Some(RegionAlias::Text),
            SectionKind::Rodata => Some(RegionAlias::Rodata),
            SectionKind::Data => Some(RegionAlias::Data),
            SectionKind::Bss => Some(RegionAlias::Bss),
            SectionKind::Heap => Some(RegionAlias::Heap),
            SectionKind::Stack => Some(RegionAlias::Stack),
        }
    }

    pub const fn role(self) -> RegionRole {
        match self.alias() {
            None => RegionRole::Flash,
            Some(alias) => alias.role(),
        }
    }
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
