//! A simulated connection that is closed on every exit path.

use scopecore_examples::{connection, init_tracing};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let status = connection::use_connection("localhost", 5432)?;
    println!("active after scope: {}", status.is_active());

    let (status, err) = connection::failing_body("localhost", 5432);
    println!("scope failed with: {err}");
    if let Some(status) = status {
        println!("active after failure: {}", status.is_active());
    }

    let status = connection::guarded("localhost", 5432)?;
    println!("active after guard: {}", status.is_active());

    if let Err(e) = connection::guarded("localhost", 0) {
        println!("rejected: {e}");
    }
    Ok(())
}
