use std::io::{self, Write};
use std::path::Path;

use scopecore::prelude::*;

/// Write `data` into a scratch file at `path` and return what was on disk
/// while the scope was open. The file is gone afterwards.
pub fn scratch(path: &Path, data: &str) -> Result<String, ScopeError<io::Error>> {
    with_scope(TempFileParams::new(path), |file| {
        file.write_all(data.as_bytes())?;
        file.flush()?;
        std::fs::read_to_string(file.path())
    })
}

/// Two nested scratch files; reports whether each existed at the checkpoints.
pub fn nested(outer: &Path, inner: &Path) -> Result<[bool; 3], ScopeError<io::Error>> {
    with_scope(TempFileParams::new(outer), |first| {
        first.write_all(b"File 1")?;
        let inner_existed = with_scope(TempFileParams::new(inner), |second| {
            second.write_all(b"File 2")?;
            Ok::<_, io::Error>(second.path().exists())
        })
        .map_err(|e| io::Error::other(e.to_string()))?;
        Ok([inner_existed, inner.exists(), first.path().exists()])
    })
}
