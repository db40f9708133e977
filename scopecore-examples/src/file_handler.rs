use std::io::{self, Read, Write};
use std::path::Path;

use scopecore::prelude::*;
use tracing::info;

/// Write `text`, append `more`, then read the whole file back.
///
/// Every step runs in its own scope, so the file is closed (and its buffer
/// flushed) before the next step opens it again.
pub fn run(path: &Path, text: &str, more: &str) -> Result<String, ScopeError<io::Error>> {
    with_scope(FileParams::write(path), |file| file.write_all(text.as_bytes()))?;
    with_scope(FileParams::append(path), |file| file.write_all(more.as_bytes()))?;

    let content = with_scope(FileParams::read(path), |file| {
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    })?;
    info!(path = %path.display(), bytes = content.len(), "read back");
    Ok(content)
}

/// Drive a [`ScopedResource`] by hand and report the states it went through.
pub fn explicit_lifecycle(path: &Path) -> Result<Vec<ResourceState>, ScopeError<io::Error>> {
    let mut scope = ScopedResource::new(FileParams::write(path));
    let mut states = vec![scope.state()];

    scope
        .enter()
        .map_err(ScopeError::<std::convert::Infallible>::widen::<io::Error>)?
        .write_all(b"Hello RAII!")
        .map_err(|error| ScopeError::Body {
            error,
            release: None,
        })?;
    states.push(scope.state());

    scope.exit()?;
    states.push(scope.state());
    Ok(states)
}
