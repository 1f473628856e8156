pub mod clock;
pub mod sample;

pub use clock::{Clock, MonotonicClock};
pub use sample::sign_extend_24;

use std::time::Duration;

/// Error type carried across the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Anything that yields signed, sign-extended ADC counts on demand.
///
/// Implementations may block inside `read_blocking`. `read_with_timeout` must report
/// an expired deadline as an error (never as a zero reading) and leave the source
/// usable for the next call.
pub trait SampleSource {
    fn read_blocking(&mut self) -> Result<i32, BoxError>;

    fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32, BoxError>;

    /// Returns `Ok(None)` when no conversion is ready yet.
    fn read_nonblocking(&mut self) -> Result<Option<i32>, BoxError>;

    fn power_down(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_blocking(&mut self) -> Result<i32, BoxError> {
        (**self).read_blocking()
    }
    fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        (**self).read_with_timeout(timeout)
    }
    fn read_nonblocking(&mut self) -> Result<Option<i32>, BoxError> {
        (**self).read_nonblocking()
    }
    fn power_down(&mut self) -> Result<(), BoxError> {
        (**self).power_down()
    }
    fn power_up(&mut self) -> Result<(), BoxError> {
        (**self).power_up()
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn read_blocking(&mut self) -> Result<i32, BoxError> {
        (**self).read_blocking()
    }
    fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        (**self).read_with_timeout(timeout)
    }
    fn read_nonblocking(&mut self) -> Result<Option<i32>, BoxError> {
        (**self).read_nonblocking()
    }
    fn power_down(&mut self) -> Result<(), BoxError> {
        (**self).power_down()
    }
    fn power_up(&mut self) -> Result<(), BoxError> {
        (**self).power_up()
    }
}

/// Erase-then-program block device (NOR flash and friends).
///
/// Offsets are device-relative byte addresses. `erase` takes a sector-aligned offset
/// and returns the whole sector to the erased state.
pub trait BlockStorage {
    fn sector_size(&self) -> u32;
    fn capacity(&self) -> u32;
    fn erase(&mut self, offset: u32) -> Result<(), BoxError>;
    fn program(&mut self, offset: u32, bytes: &[u8]) -> Result<(), BoxError>;
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), BoxError>;
}

impl<F: BlockStorage + ?Sized> BlockStorage for &mut F {
    fn sector_size(&self) -> u32 {
        (**self).sector_size()
    }
    fn capacity(&self) -> u32 {
        (**self).capacity()
    }
    fn erase(&mut self, offset: u32) -> Result<(), BoxError> {
        (**self).erase(offset)
    }
    fn program(&mut self, offset: u32, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).program(offset, bytes)
    }
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), BoxError> {
        (**self).read(offset, buf)
    }
}
