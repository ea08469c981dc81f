use crate::args::{BoardArgs, Command, LayoutArgs, MemoryArgs, Preset, SagArgs, SymbolsArgs};
use bootlayout::{Board, ResolvedLayout, SagFile, Size};
use console::style;
use eyre::{Result, WrapErr};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

impl Command {
    pub fn run(self) -> Result<()> {
        match self {
            Command::Memory(args) => args.run(),
            Command::Symbols(args) => args.run(),
            Command::Sag(args) => args.run(),
        }
    }
}

impl BoardArgs {
    fn load(&self) -> Result<Board> {
        match &self.board {
            Some(path) => Board::from_file(path)
                .wrap_err_with(|| format!("failed to load board {}", path.display())),
            None => {
                tracing::debug!("using preset {}", self.preset);
                Ok(match self.preset {
                    Preset::Ddr => Board::ae350_ddr(),
                    Preset::Ilm => Board::ae350_ilm(),
                })
            }
        }
    }
}

impl LayoutArgs {
    /// Board `[layout]` values, with anything given on the command line on top.
    fn apply(&self, board: Board) -> Board {
        let mut config = *board.config();
        if let Some(Size(heap_size)) = self.heap_size {
            config.heap_size = heap_size;
        }
        if let Some(Size(hart_stack_size)) = self.hart_stack_size {
            config.hart_stack_size = hart_stack_size;
        }
        if let Some(max_hart_id) = self.max_hart_id {
            config.max_hart_id = max_hart_id;
        }
        board.with_config(config)
    }
}

fn resolve(board: &BoardArgs, layout: &LayoutArgs) -> Result<ResolvedLayout> {
    let board = layout.apply(board.load()?);
    board
        .resolve()
        .wrap_err_with(|| format!("failed to resolve the boot layout for {}", board.name()))
}

fn output(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, contents)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote {}", style(path.display()).green());
        }
        None => print!("{contents}"),
    }
    Ok(())
}

impl MemoryArgs {
    fn run(self) -> Result<()> {
        let layout = resolve(&self.board, &self.layout)?;
        output(self.output.as_deref(), &layout.to_memory_x())
    }
}

impl SymbolsArgs {
    fn run(self) -> Result<()> {
        let layout = resolve(&self.board, &self.layout)?;
        print!("{}", SymbolTable(&layout));
        Ok(())
    }
}

/// Human-readable placement table followed by the linker symbols.
pub struct SymbolTable<'a>(pub &'a ResolvedLayout);

impl Display for SymbolTable<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let layout = self.0;
        for region in [layout.flash(), layout.ram()] {
            writeln!(
                f,
                "{} {:#010x}..{:#010x} ({}, {})",
                style(format!("{:<8}", region.name())).bold(),
                region.origin(),
                region.end(),
                Size(region.length()),
                region.attributes()
            )?;
        }
        writeln!(f)?;
        for placement in layout.placements() {
            let at = match placement.start {
                Some(start) => format!("@ {start:#010x}"),
                None => placement
                    .alias
                    .map(|alias| format!("via {alias}"))
                    .unwrap_or_default(),
            };
            writeln!(
                f,
                "{:<12} {:<8} {:<20} {}",
                placement.section.name(),
                placement.region,
                at,
                Size(placement.reserved)
            )?;
        }
        writeln!(f)?;
        for (name, value) in layout.symbols().entries() {
            writeln!(f, "{} = {value:#x}", style(format!("{name:<17}")).cyan())?;
        }
        Ok(())
    }
}

impl SagArgs {
    fn run(self) -> Result<()> {
        let sag = SagFile::from_file(&self.input)
            .wrap_err_with(|| format!("failed to parse {}", self.input.display()))?;
        if self.print_ast {
            return output(self.output.as_deref(), &format!("{sag:#?}\n"));
        }
        let board = self.board.load()?;
        let script = sag
            .to_linker_script(&board)
            .wrap_err_with(|| format!("failed to convert {}", self.input.display()))?;
        output(self.output.as_deref(), &script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn preset(preset: Preset) -> BoardArgs {
        BoardArgs {
            board: None,
            preset,
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_board() {
        let layout = resolve(
            &preset(Preset::Ilm),
            &LayoutArgs {
                heap_size: Some(Size(0x8000)),
                hart_stack_size: None,
                max_hart_id: Some(1),
            },
        )
        .unwrap();
        let symbols = layout.symbols();
        assert_eq!(symbols.heap_size, 0x8000);
        assert_eq!(symbols.hart_stack_size, 16 * 1024);
        assert_eq!(symbols.max_hart_id, 1);
        assert_eq!(symbols.stack_start, 0xA000_0000 + 0x20_0000);
    }

    #[test]
    fn test_undersized_layout_is_reported() {
        let err = resolve(
            &preset(Preset::Ilm),
            &LayoutArgs {
                heap_size: Some(Size(4 << 20)),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("ILM is too small"), "{err:#}");
    }

    #[test]
    fn test_missing_board_file() {
        let args = BoardArgs {
            board: Some(PathBuf::from("/nonexistent/board.toml")),
            preset: Preset::Ddr,
        };
        assert!(args.load().is_err());
    }

    #[test]
    fn test_symbol_table() {
        console::set_colors_enabled(false);
        let layout = resolve(&preset(Preset::Ddr), &LayoutArgs::default()).unwrap();
        let table = SymbolTable(&layout).to_string();
        assert!(table.contains(".bootloader  FLASH    @ 0x80000000"));
        assert!(table.contains(".stack       DDR      via REGION_STACK"));
        assert!(table.contains("_stack_start      = 0x8000000"));
        assert!(table.contains("_heap_size        = 0x10000"));
        assert!(table.contains("_max_hart_id      = 0x0"));
        assert!(table.contains("_hart_stack_size  = 0x4000"));
    }
}
