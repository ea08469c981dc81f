use crate::region::{MemoryRegion, RegionError};
use crate::section::{RegionAlias, RegionRole, SectionKind};
use crate::{DEFAULT_HART_STACK_SIZE, DEFAULT_HEAP_SIZE, DEFAULT_MAX_HART_ID};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("FLASH and RAM are both named {0}")]
    SharedName(String),
    #[error(
        "region {region} is too small for {what}: \
         {required:#x} bytes required, {available:#x} available"
    )]
    RegionTooSmall {
        region: String,
        what: &'static str,
        required: u64,
        available: u64,
    },
}

/// Static sizes of the linked image, used to check that it fits. Zero means "unknown". Boards set
/// it through their `[layout.footprint]` table.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    pub bootloader: u64,
    pub text: u64,
    pub rodata: u64,
    pub data: u64,
    pub bss: u64,
}

/// Fixed reservations that go into the derived symbols.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    pub heap_size: u64,
    pub hart_stack_size: u64,
    pub max_hart_id: u32,
    pub footprint: Footprint,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            heap_size: DEFAULT_HEAP_SIZE,
            hart_stack_size: DEFAULT_HART_STACK_SIZE,
            max_hart_id: DEFAULT_MAX_HART_ID,
            footprint: Footprint::default(),
        }
    }
}

impl LayoutConfig {
    pub fn with_heap_size(mut self, heap_size: u64) -> Self {
        self.heap_size = heap_size;
        self
    }
    pub fn with_hart_stack_size(mut self, hart_stack_size: u64) -> Self {
        self.hart_stack_size = hart_stack_size;
        self
    }
    pub fn with_max_hart_id(mut self, max_hart_id: u32) -> Self {
        self.max_hart_id = max_hart_id;
        self
    }
    pub fn with_footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = footprint;
        self
    }

    /// Stack space for every hart, `None` on overflow.
    pub fn total_stack_size(&self) -> Option<u64> {
        (u64::from(self.max_hart_id) + 1).checked_mul(self.hart_stack_size)
    }
}

/// Address constants exported to startup code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Symbols {
    /// `_stack_start`: one past the end of RAM.
    pub stack_start: u64,
    /// `_heap_size`
    pub heap_size: u64,
    /// `_hart_stack_size`
    pub hart_stack_size: u64,
    /// `_max_hart_id`
    pub max_hart_id: u32,
}

impl Symbols {
    /// Linker symbol names paired with their values, in emission order.
    pub fn entries(&self) -> [(&'static str, u64); 4] {
        [
            ("_stack_start", self.stack_start),
            ("_heap_size", self.heap_size),
            ("_max_hart_id", u64::from(self.max_hart_id)),
            ("_hart_stack_size", self.hart_stack_size),
        ]
    }
}

/// Where one section goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub section: SectionKind,
    /// Name of the physical region that backs the section.
    pub region: String,
    pub alias: Option<RegionAlias>,
    /// Fixed start address; only the bootloader has one, the runtime places the rest.
    pub start: Option<u64>,
    /// Bytes set aside for the section; zero if unknown.
    pub reserved: u64,
}

/// A FLASH and RAM pair waiting to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootLayout {
    flash: MemoryRegion,
    ram: MemoryRegion,
}

impl BootLayout {
    pub fn new(flash: MemoryRegion, ram: MemoryRegion) -> Result<Self, LayoutError> {
        if flash.name() == ram.name() {
            return Err(LayoutError::SharedName(flash.name().to_string()));
        }
        if flash.overlaps(&ram) {
            tracing::warn!(
                "{} [{:#010x}, {:#010x}) overlaps {} [{:#010x}, {:#010x})",
                flash.name(),
                flash.origin(),
                flash.end(),
                ram.name(),
                ram.origin(),
                ram.end()
            );
        }
        Ok(Self { flash, ram })
    }

    pub fn flash(&self) -> &MemoryRegion {
        &self.flash
    }
    pub fn ram(&self) -> &MemoryRegion {
        &self.ram
    }

    /// Computes placements and symbols. Depends only on the regions and `config`.
    pub fn resolve(&self, config: &LayoutConfig) -> Result<ResolvedLayout, LayoutError> {
        let fp = &config.footprint;
        let stacks = config.total_stack_size().unwrap_or(u64::MAX);

        let ram_required = sum(&[config.heap_size, stacks, fp.data, fp.bss]);
        tracing::debug!(
            "{}: {ram_required:#x} of {:#x} bytes reserved",
            self.ram.name(),
            self.ram.length()
        );
        if ram_required > self.ram.length() {
            return Err(LayoutError::RegionTooSmall {
                region: self.ram.name().to_string(),
                what: "heap, hart stacks, data and bss",
                required: ram_required,
                available: self.ram.length(),
            });
        }

        let flash_required = sum(&[fp.bootloader, fp.text, fp.rodata, fp.data]);
        tracing::debug!(
            "{}: {flash_required:#x} of {:#x} bytes reserved",
            self.flash.name(),
            self.flash.length()
        );
        if flash_required > self.flash.length() {
            return Err(LayoutError::RegionTooSmall {
                region: self.flash.name().to_string(),
                what: "bootloader, text, rodata and data load image",
                required: flash_required,
                available: self.flash.length(),
            });
        }

        let placements = SectionKind::PLACEMENT_ORDER
            .iter()
            .map(|&section| {
                let region = match section.role() {
                    RegionRole::Flash => &self.flash,
                    RegionRole::Ram => &self.ram,
                };
                let (start, reserved) = match section {
                    SectionKind::Bootloader => (Some(self.flash.origin()), fp.bootloader),
                    SectionKind::Text => (None, fp.text),
                    SectionKind::Rodata => (None, fp.rodata),
                    SectionKind::Data => (None, fp.data),
                    SectionKind::Bss => (None, fp.bss),
                    SectionKind::Heap => (None, config.heap_size),
                    SectionKind::Stack => (None, stacks),
                };
                Placement {
                    section,
                    region: region.name().to_string(),
                    alias: section.alias(),
                    start,
                    reserved,
                }
            })
            .collect();

        let symbols = Symbols {
            stack_start: self.ram.end(),
            heap_size: config.heap_size,
            hart_stack_size: config.hart_stack_size,
            max_hart_id: config.max_hart_id,
        };
        tracing::debug!("resolved symbols: {symbols:?}");

        Ok(ResolvedLayout {
            flash: self.flash.clone(),
            ram: self.ram.clone(),
            placements,
            symbols,
        })
    }
}

fn sum(parts: &[u64]) -> u64 {
    parts
        .iter()
        .try_fold(0u64, |acc, &n| acc.checked_add(n))
        .unwrap_or(u64::MAX)
}

/// The outcome of [`BootLayout::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    flash: MemoryRegion,
    ram: MemoryRegion,
    placements: Vec<Placement>,
    symbols: Symbols,
}

impl ResolvedLayout {
    pub fn flash(&self) -> &MemoryRegion {
        &self.flash
    }
    pub fn ram(&self) -> &MemoryRegion {
        &self.ram
    }
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }
    pub fn bootloader_start(&self) -> u64 {
        self.flash.origin()
    }

    /// The region an alias resolves to.
    pub fn alias_target(&self, alias: RegionAlias) -> &MemoryRegion {
        match alias.role() {
            RegionRole::Flash => &self.flash,
            RegionRole::Ram => &self.ram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Attributes;
    use rand::Rng;

    fn flash(origin: u64, length: u64) -> MemoryRegion {
        MemoryRegion::new("FLASH", origin, length, Attributes::RX).unwrap()
    }
    fn ram(origin: u64, length: u64) -> MemoryRegion {
        MemoryRegion::new("RAM", origin, length, Attributes::RWX).unwrap()
    }

    #[test]
    fn test_defaults() {
        let layout = BootLayout::new(flash(0, 0x10_0000), ram(0x2000_0000, 0x2_0000))
            .unwrap()
            .resolve(&LayoutConfig::default())
            .unwrap();
        let symbols = layout.symbols();
        assert_eq!(symbols.heap_size, 65536);
        assert_eq!(symbols.hart_stack_size, 16384);
        assert_eq!(symbols.max_hart_id, 0);
        assert_eq!(symbols.stack_start, 0x2000_0000 + 0x2_0000);
    }

    /// FLASH = [0, 0x100000), RAM of length 0x20000 at an offset.
    #[test]
    fn test_stack_top_scenario() {
        for ram_base in [0u64, 0x1000, 0x8000_0000, 0xA000_0000] {
            let layout = BootLayout::new(flash(0, 0x10_0000), ram(ram_base, 0x2_0000))
                .unwrap()
                .resolve(&LayoutConfig::default())
                .unwrap();
            assert_eq!(layout.symbols().stack_start, ram_base + 0x2_0000);
            assert_eq!(layout.bootloader_start(), 0);
        }
    }

    #[test]
    fn test_placement_order() {
        let layout = BootLayout::new(flash(0x8000_0000, 0x1000_0000), ram(0, 0x800_0000))
            .unwrap()
            .resolve(&LayoutConfig::default())
            .unwrap();
        let placements = layout.placements();
        let order: Vec<SectionKind> = placements.iter().map(|p| p.section).collect();
        assert_eq!(order, SectionKind::PLACEMENT_ORDER.to_vec());

        assert_eq!(placements[0].start, Some(0x8000_0000));
        assert_eq!(placements[0].alias, None);
        assert!(placements[1..].iter().all(|p| p.start.is_none()));

        for p in placements {
            let expected = match p.section {
                SectionKind::Bootloader | SectionKind::Text | SectionKind::Rodata => "FLASH",
                _ => "RAM",
            };
            assert_eq!(p.region, expected, "{} in wrong region", p.section);
        }
        assert_eq!(layout.alias_target(RegionAlias::Stack).name(), "RAM");
        assert_eq!(layout.alias_target(RegionAlias::Rodata).name(), "FLASH");
    }

    #[test]
    fn test_overrides() {
        let config = LayoutConfig::default()
            .with_heap_size(0x8000)
            .with_hart_stack_size(0x1000)
            .with_max_hart_id(3);
        let layout = BootLayout::new(flash(0, 0x10_0000), ram(0x1000_0000, 0x2_0000))
            .unwrap()
            .resolve(&config)
            .unwrap();
        let symbols = layout.symbols();
        assert_eq!(symbols.heap_size, 0x8000);
        assert_eq!(symbols.hart_stack_size, 0x1000);
        assert_eq!(symbols.max_hart_id, 3);
        let stack = layout
            .placements()
            .iter()
            .find(|p| p.section == SectionKind::Stack)
            .unwrap();
        assert_eq!(stack.reserved, 4 * 0x1000);
    }

    #[test]
    fn test_ram_too_small() {
        let err = BootLayout::new(flash(0, 0x10_0000), ram(0x2000_0000, 32 * 1024))
            .unwrap()
            .resolve(&LayoutConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::RegionTooSmall {
                region: "RAM".to_string(),
                what: "heap, hart stacks, data and bss",
                required: 64 * 1024 + 16 * 1024,
                available: 32 * 1024,
            }
        );

        // exactly full is fine
        BootLayout::new(flash(0, 0x10_0000), ram(0x2000_0000, 80 * 1024))
            .unwrap()
            .resolve(&LayoutConfig::default())
            .unwrap();
    }

    #[test]
    fn test_flash_too_small() {
        let config = LayoutConfig::default().with_footprint(Footprint {
            bootloader: 0x100,
            text: 0x800,
            rodata: 0x400,
            data: 0x100,
            bss: 0,
        });
        BootLayout::new(flash(0, 0xe00), ram(0x2000_0000, 0x2_0000))
            .unwrap()
            .resolve(&config)
            .unwrap();
        let err = BootLayout::new(flash(0, 0xc00), ram(0x2000_0000, 0x2_0000))
            .unwrap()
            .resolve(&config)
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::RegionTooSmall {
                region: "FLASH".to_string(),
                what: "bootloader, text, rodata and data load image",
                required: 0xe00,
                available: 0xc00,
            }
        );

        // one byte short
        let err = BootLayout::new(flash(0, 0xdff), ram(0x2000_0000, 0x2_0000))
            .unwrap()
            .resolve(&config)
            .unwrap_err();
        assert!(matches!(err, LayoutError::RegionTooSmall { required: 0xe00, .. }));
    }

    #[test]
    fn test_overflowing_reservation() {
        let config = LayoutConfig::default()
            .with_hart_stack_size(u64::MAX)
            .with_max_hart_id(1);
        let err = BootLayout::new(flash(0, 0x1000), ram(0x2000_0000, 0x2_0000))
            .unwrap()
            .resolve(&config)
            .unwrap_err();
        assert!(matches!(
            err,
            LayoutError::RegionTooSmall { required: u64::MAX, .. }
        ));
    }

    #[test]
    fn test_shared_name() {
        let a = MemoryRegion::new("MEM", 0, 0x1000, Attributes::RWX).unwrap();
        assert_eq!(
            BootLayout::new(a.clone(), a),
            Err(LayoutError::SharedName("MEM".to_string()))
        );
    }

    /// Randomized check of the bootloader-at-origin and stack-top invariants, and that resolving
    /// is a pure function of its inputs.
    #[test]
    fn test_random_regions() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let flash_origin = rng.gen_range(0..=u64::from(u32::MAX)) & !0xfff;
            let flash_length = rng.gen_range(1..=0x1000_0000u64);
            let ram_origin = rng.gen_range(0..=u64::from(u32::MAX)) & !0xfff;
            let ram_length = rng.gen_range(80 * 1024..=0x1000_0000u64);

            let boot =
                BootLayout::new(flash(flash_origin, flash_length), ram(ram_origin, ram_length))
                    .unwrap();
            let first = boot.resolve(&LayoutConfig::default()).unwrap();
            let second = boot.resolve(&LayoutConfig::default()).unwrap();

            assert_eq!(first, second);
            assert_eq!(first.placements()[0].section, SectionKind::Bootloader);
            assert_eq!(first.placements()[0].start, Some(flash_origin));
            assert_eq!(first.bootloader_start(), flash_origin);
            assert_eq!(first.symbols().stack_start, ram_origin + ram_length);
        }
    }
}
