use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use fmeperf_raw::fme::FME_PERF_REGION_SIZE;
use fmeperf_raw::{MmioRegion, RegisterWindow};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::error::{FmeError, Result};

/// A PCI BAR resource file (`/sys/bus/pci/devices/*/resourceN`) mapped
/// into the process
pub struct MappedBar {
    path: PathBuf,
    base: NonNull<u8>,
    len: usize,
    _file: File,
}

// The mapping is shared device memory and only ever touched through
// volatile 64-bit accesses.
unsafe impl Send for MappedBar {}
unsafe impl Sync for MappedBar {}

impl MappedBar {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|e| {
                FmeError::MmioError(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let len = file.metadata()?.len() as usize;
        let length = NonZeroUsize::new(len).ok_or_else(|| {
            FmeError::MmioError(format!("{} has no mappable length", path.display()))
        })?;

        // SAFETY: a fresh shared mapping of the whole file; nothing else in
        // this process aliases it.
        let addr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&file),
                0,
            )?
        };
        let base = NonNull::new(addr as *mut u8)
            .ok_or_else(|| FmeError::MmioError("mmap returned a null mapping".to_string()))?;

        tracing::info!("Mapped {} ({} bytes) at {:p}", path.display(), len, base);

        Ok(Self {
            path: path.to_path_buf(),
            base,
            len,
            _file: file,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn region(&self) -> Result<MmioRegion> {
        // SAFETY: the mapping lives as long as `self`, and every
        // `FeatureWindow` carved from it keeps `self` alive.
        Ok(unsafe { MmioRegion::from_raw_parts(self.base, self.len)? })
    }
}

impl Drop for MappedBar {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe exactly the mapping created in `open`.
        if let Err(e) = unsafe { munmap(self.base.as_ptr().cast(), self.len) } {
            tracing::warn!("Failed to unmap {}: {}", self.path.display(), e);
        }
    }
}

/// The perf feature's registers inside a mapped BAR
pub struct FeatureWindow {
    region: MmioRegion,
    offset: usize,
    _bar: Arc<MappedBar>,
}

impl FeatureWindow {
    pub fn new(bar: Arc<MappedBar>, offset: usize) -> Result<Self> {
        let region = bar.region()?.subregion(offset, FME_PERF_REGION_SIZE)?;
        Ok(Self {
            region,
            offset,
            _bar: bar,
        })
    }

    /// Feature offset inside the BAR
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl RegisterWindow for FeatureWindow {
    fn read64(&self, offset: u64) -> u64 {
        self.region.read64(offset)
    }

    fn write64(&self, offset: u64, value: u64) {
        self.region.write64(offset, value)
    }
}

/// Process-wide registry of mapped BARs, keyed by resource path
pub struct Mmio {
    bars: RwLock<HashMap<PathBuf, Arc<MappedBar>>>,
}

impl Mmio {
    fn new() -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
        }
    }

    pub fn instance() -> &'static Mmio {
        static INSTANCE: Lazy<Mmio> = Lazy::new(Mmio::new);
        &INSTANCE
    }

    fn get_bar(&self, path: &Path) -> Result<Arc<MappedBar>> {
        {
            let bars = self.bars.read();
            if let Some(bar) = bars.get(path) {
                return Ok(Arc::clone(bar));
            }
        }

        let mut bars = self.bars.write();
        if let Some(bar) = bars.get(path) {
            return Ok(Arc::clone(bar));
        }

        let bar = Arc::new(MappedBar::open(path)?);
        bars.insert(path.to_path_buf(), Arc::clone(&bar));
        Ok(bar)
    }

    /// Register window of the perf feature at `offset` in the BAR at `path`
    pub fn feature_window(&self, path: &Path, offset: usize) -> Result<Arc<FeatureWindow>> {
        let bar = self.get_bar(path)?;
        Ok(Arc::new(FeatureWindow::new(bar, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(name: &str, len: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fmeperf-{}-{}", name, std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_window_over_file_mapping() {
        let path = scratch_file("window", 4096);
        let window = Mmio::instance().feature_window(&path, 0x1000 - 0x100).unwrap();

        window.write64(0x20, 0x0080_0000);
        assert_eq!(window.read64(0x20), 0x0080_0000);
        assert_eq!(window.offset(), 0xf00);

        // same BAR, second window sees the same memory
        let again = Mmio::instance().feature_window(&path, 0xf00).unwrap();
        assert_eq!(again.read64(0x20), 0x0080_0000);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_window_past_end_rejected() {
        let path = scratch_file("short", 4096);
        assert!(Mmio::instance().feature_window(&path, 0xfc0).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_resource() {
        let err = MappedBar::open(Path::new("/nonexistent/resource0"));
        assert!(matches!(err, Err(FmeError::MmioError(_))));
    }
}
