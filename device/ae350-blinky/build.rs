fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    bootlayout::build::emit_for_board("board.toml")
        .unwrap_or_else(|e| panic!("failed to generate memory.x: {e}"));
}
