use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Width of the operator display in characters.
pub const DISPLAY_COLS: usize = 16;

/// Wait until `is_high` turns false (line pulled low) or `timeout` passes.
/// Sleeps `poll_interval` between checks.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Center `text` in a display row, truncating anything wider.
pub fn center_line(text: &str) -> String {
    let chars: Vec<char> = text.chars().take(DISPLAY_COLS).collect();
    let pad = (DISPLAY_COLS - chars.len()) / 2;
    let mut out = " ".repeat(pad);
    out.extend(chars);
    while out.chars().count() < DISPLAY_COLS {
        out.push(' ');
    }
    out
}

/// Replace `path` with `bytes` so a crash leaves either the old or the new
/// contents: write a sibling temp file, fsync, rename, then fsync the directory.
/// A failed write or rename removes the temp file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    let staged = fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(bytes)?;
        f.sync_all()
    });
    if let Err(e) = staged.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        // Directory fsync is not supported everywhere; the rename already happened.
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Mixing", "     Mixing     ")]
    #[case("", "                ")]
    #[case("Camera webserver", "Camera webserver")]
    #[case("a much longer line than fits", "a much longer li")]
    fn centers_and_truncates(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(center_line(input), expected);
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.toml");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!path.with_extension("new").exists());
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be replaced by a file
        let path = dir.path().join("progress");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        assert!(write_atomic(&path, b"one").is_err());
        assert!(!path.with_extension("new").exists());
        assert!(path.join("keep").exists());
    }
}
