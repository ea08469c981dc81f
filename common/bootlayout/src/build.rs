//! For use from a firmware crate's `build.rs`:
//!
//! ```no_run
//! fn main() {
//!     bootlayout::build::emit_for_board("board.toml").unwrap();
//! }
//! ```
//!
//! and link with `-Tlink.x` as usual for riscv-rt; `link.x` pulls in the generated `memory.x`.

use crate::board::{Board, BoardError};
use crate::layout::ResolvedLayout;
use crate::sag::SagFile;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("OUT_DIR is not set; not running under cargo?")]
    NoOutDir,
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Board(#[from] BoardError),
}

fn out_dir() -> Result<PathBuf, BuildError> {
    std::env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or(BuildError::NoOutDir)
}

fn write(path: PathBuf, contents: &str) -> Result<PathBuf, BuildError> {
    match std::fs::write(&path, contents) {
        Ok(()) => Ok(path),
        Err(source) => Err(BuildError::Write { path, source }),
    }
}

/// Writes `memory.x` for `layout` into `out_dir` and returns its path.
pub fn write_memory_x(layout: &ResolvedLayout, out_dir: &Path) -> Result<PathBuf, BuildError> {
    write(out_dir.join("memory.x"), &layout.to_memory_x())
}

/// Resolves the board at `path` and writes its `memory.x` into `OUT_DIR`.
pub fn emit_for_board(path: impl AsRef<Path>) -> Result<PathBuf, BuildError> {
    let path = path.as_ref();
    println!("cargo:rerun-if-changed={}", path.display());
    let layout = Board::from_file(path)?.resolve()?;
    let out_dir = out_dir()?;
    let memory_x = write_memory_x(&layout, &out_dir)?;
    println!("cargo:rustc-link-search={}", out_dir.display());
    Ok(memory_x)
}

/// Converts the SAG file at `sag_path` into `OUT_DIR/memory.x`. If the SAG file cannot be read or
/// parsed, `board`'s plain boot layout is written instead, with a cargo warning.
pub fn emit_for_sag(sag_path: impl AsRef<Path>, board: &Board) -> Result<PathBuf, BuildError> {
    let sag_path = sag_path.as_ref();
    println!("cargo:rerun-if-changed={}", sag_path.display());
    let out_dir = out_dir()?;

    let script = match SagFile::from_file(sag_path).and_then(|sag| sag.to_linker_script(board)) {
        Ok(script) => script,
        Err(e) => {
            println!("cargo:warning=could not convert {}: {e}", sag_path.display());
            println!("cargo:warning=falling back to the {} boot layout", board.name());
            board.resolve()?.to_memory_x()
        }
    };
    let path = write(out_dir.join("memory.x"), &script)?;
    println!("cargo:rustc-link-search={}", out_dir.display());
    Ok(path)
}
