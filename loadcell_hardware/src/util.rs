use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use loadcell_traits::Clock;

use crate::error::{HwError, Result};

/// Wait until the provided `is_high` predicate becomes false (i.e., line goes low),
/// or a timeout expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
    clock: &impl Clock,
) -> Result<()> {
    let deadline = clock.deadline(timeout);
    while is_high()? {
        if clock.now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}

/// Replace `path` with `bytes` so readers see either the old or the new image.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
