//! Scratch files that only exist while their scope is open.

use scopecore_examples::{init_tracing, temporary_file};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let dir = std::env::temp_dir().join("scopecore-temporary-file");
    std::fs::create_dir_all(&dir)?;

    let data = temporary_file::scratch(&dir.join("temp.txt"), "Temporary data")?;
    println!("wrote and removed: {data}");

    let [inner_existed, inner_after, outer_during] =
        temporary_file::nested(&dir.join("temp1.txt"), &dir.join("temp2.txt"))?;
    println!("inner existed: {inner_existed}, after inner scope: {inner_after}, outer still there: {outer_during}");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
