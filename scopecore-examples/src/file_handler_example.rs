//! Write, append and read a file, each step in its own scope.

use scopecore_examples::{file_handler, init_tracing};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let dir = std::env::temp_dir().join("scopecore-file-handler");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("example.txt");

    let content = file_handler::run(&path, "Hello RAII!", " Appended content")?;
    println!("{content}");

    let states = file_handler::explicit_lifecycle(&path)?;
    println!("states: {states:?}");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
