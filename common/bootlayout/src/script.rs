use crate::layout::ResolvedLayout;
use crate::region::{MemoryRegion, Size};
use crate::section::RegionAlias;
use crate::BOOTLOADER_SECTION;
use std::fmt::{Display, Formatter};

/// Renders a [`ResolvedLayout`] as a `memory.x` for riscv-rt's `link.x`.
pub struct MemoryX<'a>(&'a ResolvedLayout);

impl ResolvedLayout {
    pub fn memory_x(&self) -> MemoryX<'_> {
        MemoryX(self)
    }

    pub fn to_memory_x(&self) -> String {
        self.memory_x().to_string()
    }
}

/// One `MEMORY` block line, shared with the SAG emitter.
pub(crate) fn write_memory_line(
    f: &mut impl std::fmt::Write,
    region: &MemoryRegion,
) -> std::fmt::Result {
    writeln!(
        f,
        "    {} ({}) : ORIGIN = {:#010X}, LENGTH = {}",
        region.name(),
        region.attributes(),
        region.origin(),
        Size(region.length())
    )
}

impl Display for MemoryX<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let layout = self.0;
        let flash = layout.flash().name();
        let ram = layout.ram().name();

        writeln!(f, "/* Generated by bootlayout; do not edit. */")?;
        writeln!(f)?;
        writeln!(f, "MEMORY")?;
        writeln!(f, "{{")?;
        write_memory_line(f, layout.flash())?;
        write_memory_line(f, layout.ram())?;
        writeln!(f, "}}")?;
        writeln!(f)?;

        // Reset lands on ORIGIN(FLASH), so the bootloader has to be the first thing there.
        writeln!(f, "SECTIONS")?;
        writeln!(f, "{{")?;
        writeln!(f, "    {BOOTLOADER_SECTION} ORIGIN({flash}) :")?;
        writeln!(f, "    {{")?;
        writeln!(f, "        KEEP(*({BOOTLOADER_SECTION}));")?;
        writeln!(f, "        KEEP(*({BOOTLOADER_SECTION}.*));")?;
        writeln!(f, "    }} > {flash}")?;
        writeln!(f, "}}")?;
        writeln!(f, "INSERT BEFORE .text;")?;
        writeln!(f)?;
        writeln!(
            f,
            "_stext = ALIGN(ORIGIN({flash}) + SIZEOF({BOOTLOADER_SECTION}), 4);"
        )?;
        writeln!(f)?;

        for alias in RegionAlias::ALL {
            writeln!(
                f,
                "REGION_ALIAS(\"{}\", {});",
                alias.name(),
                layout.alias_target(alias).name()
            )?;
        }
        writeln!(f)?;

        let symbols = layout.symbols();
        writeln!(
            f,
            "_stack_start = ORIGIN({ram}) + LENGTH({ram}); /* {:#010X} */",
            symbols.stack_start
        )?;
        writeln!(f, "_heap_size = {:#X};", symbols.heap_size)?;
        writeln!(f, "_max_hart_id = {};", symbols.max_hart_id)?;
        writeln!(f, "_hart_stack_size = {:#X};", symbols.hart_stack_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::layout::{BootLayout, LayoutConfig};
    use crate::region::{Attributes, MemoryRegion};

    fn ae350_ddr() -> BootLayout {
        BootLayout::new(
            MemoryRegion::new("FLASH", 0x8000_0000, 256 << 20, Attributes::RX).unwrap(),
            MemoryRegion::new("DDR", 0, 128 << 20, Attributes::RWX).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_memory_x_contents() {
        let script = ae350_ddr()
            .resolve(&LayoutConfig::default())
            .unwrap()
            .to_memory_x();

        assert!(script.contains("    FLASH (rx) : ORIGIN = 0x80000000, LENGTH = 256M\n"));
        assert!(script.contains("    DDR (rwx) : ORIGIN = 0x00000000, LENGTH = 128M\n"));
        assert!(script.contains("    .bootloader ORIGIN(FLASH) :\n"));
        assert!(script.contains("        KEEP(*(.bootloader));\n"));
        assert!(script.contains("    } > FLASH\n}\nINSERT BEFORE .text;\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_TEXT\", FLASH);\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_RODATA\", FLASH);\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_DATA\", DDR);\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_BSS\", DDR);\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_HEAP\", DDR);\n"));
        assert!(script.contains("REGION_ALIAS(\"REGION_STACK\", DDR);\n"));
        assert!(script.contains("_stack_start = ORIGIN(DDR) + LENGTH(DDR); /* 0x08000000 */\n"));
        assert!(script.contains("_heap_size = 0x10000;\n"));
        assert!(script.contains("_max_hart_id = 0;\n"));
        assert!(script.contains("_hart_stack_size = 0x4000;\n"));
    }

    #[test]
    fn test_bootloader_precedes_aliases() {
        let script = ae350_ddr()
            .resolve(&LayoutConfig::default())
            .unwrap()
            .to_memory_x();
        let bootloader = script.find(".bootloader ORIGIN(FLASH)").unwrap();
        let first_alias = script.find("REGION_ALIAS").unwrap();
        assert!(bootloader < first_alias);
    }

    #[test]
    fn test_memory_x_is_deterministic() {
        let config = LayoutConfig::default().with_max_hart_id(1);
        let a = ae350_ddr().resolve(&config).unwrap().to_memory_x();
        let b = ae350_ddr().resolve(&config).unwrap().to_memory_x();
        assert_eq!(a, b);
        assert!(a.contains("_max_hart_id = 1;\n"));
    }
}
