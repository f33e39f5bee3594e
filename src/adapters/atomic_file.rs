//! Write-then-rename file replacement.

use std::fs;
use std::io;
use std::path::Path;

/// Writes `bytes` to `<path>.tmp` and renames it over `path`, so readers see
/// either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    fs::write(tmp_path, bytes)?;
    fs::rename(tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(tmp_path);
    })
}
