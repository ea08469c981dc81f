use crate::board::Board;
use crate::sag::{expand_section_pattern, Directive, Region, SagError, SagFile};
use crate::script::write_memory_line;
use std::fmt::{Display, Formatter};

impl SagFile {
    /// Emits a complete GNU LD script for this layout, using `board` for the `MEMORY` block and to
    /// decide which region each output section lands in.
    pub fn to_linker_script(&self, board: &Board) -> Result<String, SagError> {
        let mut lma = 0u64;
        let mut addresses = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            lma = block.lma.resolve(lma)?;
            if let Some(align) = block.alignment {
                lma = lma
                    .checked_next_multiple_of(align)
                    .ok_or(SagError::AddressOutOfRange {
                        base: lma,
                        offset: align as i64,
                    })?;
            }
            tracing::debug!("{} block at LMA {lma:#010x}", block.kind.keyword());
            let vmas = block
                .regions
                .iter()
                .map(|region| region.vma.resolve(lma))
                .collect::<Result<Vec<_>, _>>()?;
            addresses.push((lma, vmas));
        }

        Ok(LinkerScript {
            sag: self,
            board,
            addresses,
        }
        .to_string())
    }
}

struct LinkerScript<'a> {
    sag: &'a SagFile,
    board: &'a Board,
    /// Per block: its LMA and the VMA of each region.
    addresses: Vec<(u64, Vec<u64>)>,
}

impl Display for LinkerScript<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "/* Generated by bootlayout from SAG; board: {} */", self.board.name())?;
        writeln!(f)?;
        writeln!(f, "OUTPUT_ARCH(riscv)")?;
        writeln!(f, "ENTRY(_start)")?;
        writeln!(f)?;

        writeln!(f, "MEMORY")?;
        writeln!(f, "{{")?;
        for region in self.board.regions() {
            write_memory_line(f, region)?;
        }
        writeln!(f, "}}")?;
        writeln!(f)?;

        if let Some(stack) = self.sag.stack() {
            writeln!(f, "__stack_top = {stack:#010X};")?;
            writeln!(f)?;
        }

        writeln!(f, "SECTIONS")?;
        writeln!(f, "{{")?;
        for (block, (lma, vmas)) in self.sag.blocks.iter().zip(&self.addresses) {
            writeln!(f)?;
            writeln!(f, "    /* {} @ LMA {lma:#010X} */", block.kind.keyword())?;
            // sections are loaded back to back, starting at the block's LMA
            let mut previous_load: Option<String> = None;
            for (region, &vma) in block.regions.iter().zip(vmas) {
                self.region(f, region, *lma, vma, &mut previous_load)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "    PROVIDE(_end = .);")?;
        writeln!(f, "    PROVIDE(end = .);")?;
        writeln!(f, "}}")
    }
}

impl LinkerScript<'_> {
    fn region(
        &self,
        f: &mut Formatter<'_>,
        region: &Region,
        lma: u64,
        vma: u64,
        previous_load: &mut Option<String>,
    ) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "    /* {}: VMA {vma:#010X}, LMA {lma:#010X} */", region.name)?;

        let run_region = self.board.region_for(vma);
        let memory = match run_region {
            Some(r) => r.name(),
            None => {
                tracing::warn!(
                    "VMA {vma:#010x} of {} is outside every board region, placing it in RAM",
                    region.name
                );
                self.board.ram_region().map(|r| r.name()).unwrap_or("RAM")
            }
        };
        let in_place =
            run_region.map(|r| r.name()) == self.board.region_for(lma).map(|r| r.name());

        // (directive index, output section), in emission order
        let sections: Vec<(usize, String)> = region
            .directives
            .iter()
            .enumerate()
            .filter_map(|(i, d)| match d {
                Directive::Section { pattern, .. } => Some((i, pattern)),
                _ => None,
            })
            .flat_map(|(i, pattern)| {
                expand_section_pattern(pattern)
                    .into_iter()
                    .map(move |section| (i, section))
            })
            .collect();
        let before = |i: usize| {
            sections
                .iter()
                .rev()
                .find(|(at, _)| *at < i)
                .map(|(_, s)| s.as_str())
        };
        let after = |i: usize| {
            sections
                .iter()
                .find(|(at, _)| *at > i)
                .map(|(_, s)| s.as_str())
        };

        let mut placed = false;
        for (i, directive) in region.directives.iter().enumerate() {
            match directive {
                Directive::Addr { symbol, next } => {
                    match boundary("ADDR", *next, before(i), after(i)) {
                        Some(address) => writeln!(f, "    {symbol} = {address};")?,
                        None => writeln!(f, "    {symbol} = {vma:#010X};")?,
                    }
                }
                Directive::LoadAddr { symbol, next } => {
                    match boundary("LOADADDR", *next, before(i), after(i)) {
                        Some(address) => writeln!(f, "    {symbol} = {address};")?,
                        None if in_place => writeln!(f, "    {symbol} = {vma:#010X};")?,
                        None => match previous_load.as_deref() {
                            Some(prev) => writeln!(
                                f,
                                "    {symbol} = LOADADDR(.{prev}) + SIZEOF(.{prev});"
                            )?,
                            None => writeln!(f, "    {symbol} = {lma:#010X};")?,
                        },
                    }
                }
                Directive::Section { pattern, keep } => {
                    for section in expand_section_pattern(pattern) {
                        // the first output section pins the region's run address
                        let address = if placed {
                            String::new()
                        } else {
                            format!(" {vma:#010X}")
                        };
                        placed = true;
                        let load = match (in_place, previous_load.as_deref()) {
                            (true, _) => String::new(),
                            (false, None) => format!(" AT({lma:#010X})"),
                            (false, Some(prev)) => {
                                format!(" AT(LOADADDR(.{prev}) + SIZEOF(.{prev}))")
                            }
                        };
                        writeln!(f, "    .{section}{address} :{load}")?;
                        // in-place sections occupy load space too
                        *previous_load = Some(section.clone());

                        writeln!(f, "    {{")?;
                        if *keep {
                            writeln!(f, "        KEEP(*(.{section}))")?;
                            writeln!(f, "        KEEP(*(.{section}.*))")?;
                        } else {
                            writeln!(f, "        *(.{section})")?;
                            writeln!(f, "        *(.{section}.*)")?;
                        }
                        writeln!(f, "    }} > {memory}")?;
                    }
                }
                // emitted once, ahead of SECTIONS
                Directive::Stack(_) => {}
            }
        }
        Ok(())
    }
}

/// `func(.s)` for the section after a symbol, or the end of the one before it. `NEXT` prefers the
/// end of the preceding section.
fn boundary(func: &str, next: bool, before: Option<&str>, after: Option<&str>) -> Option<String> {
    let end = before.map(|s| format!("{func}(.{s}) + SIZEOF(.{s})"));
    let start = after.map(|s| format!("{func}(.{s})"));
    if next {
        end.or(start)
    } else {
        start.or(end)
    }
}
