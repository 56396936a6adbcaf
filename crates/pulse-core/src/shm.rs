//! Cross-process shared price store.
//!
//! A named POSIX shared memory region holding one fixed-width [`PriceSlot`]
//! per configured instrument. The creating process initializes the layout;
//! any number of unrelated processes attach by name and see each other's
//! updates. Slot indices are assigned from the instrument list at creation
//! time and never change, so creator and attachers must supply the same
//! list.
//!
//! # Memory layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ StoreHeader (lock word, slot_count)          │
//! ├──────────────────────────────────────────────┤
//! │ PriceSlot[0]: symbol, price, timestamp       │
//! │ PriceSlot[1]                                 │
//! │ ...                                          │
//! │ PriceSlot[N-1]                               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Synchronization
//!
//! One spinlock word lives inside the region itself, so it is valid across
//! process boundaries — a plain in-process mutex would not be. Every read
//! and write takes it; there is no per-slot locking. Contention is global
//! but slots are small and updates brief.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use tracing::{error, info, warn};

use crate::error::PulseError;
use crate::types::symbol::{SYMBOL_LEN, symbol_from_bytes, symbol_to_bytes};

// ---------------------------------------------------------------------------
// In-region structures
// ---------------------------------------------------------------------------

/// Header at the start of the shared region.
#[repr(C)]
struct StoreHeader {
    /// Cross-process spinlock word: 0 = unlocked, 1 = held.
    lock: AtomicU32,
    /// Number of slots in this region.
    slot_count: u32,
}

/// Fixed-width record for one instrument.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PriceSlot {
    pub symbol: [u8; SYMBOL_LEN],
    pub price: f64,
    pub timestamp: f64,
}

// ---------------------------------------------------------------------------
// SharedPriceStore
// ---------------------------------------------------------------------------

/// One process's view of the shared price region.
///
/// The creating handle owns the region lifecycle ([`SharedPriceStore::unlink`]);
/// attached handles must only ever [`SharedPriceStore::close`].
#[derive(Debug)]
pub struct SharedPriceStore {
    base: *mut u8,
    total_size: usize,
    name: String,
    /// Symbol -> slot index, fixed at creation/attach from the instrument list.
    symbol_index: AHashMap<String, usize>,
    /// Cleared by `close()`; guards against use-after-unmap.
    attached: AtomicBool,
}

// SAFETY: the pointer targets an mmap'd (or heap-fallback) region that lives
// until `close()`. All slot access goes through the in-region lock, and
// `attached` gates access after close.
unsafe impl Send for SharedPriceStore {}
unsafe impl Sync for SharedPriceStore {}

impl SharedPriceStore {
    fn region_size(slot_count: usize) -> usize {
        std::mem::size_of::<StoreHeader>() + slot_count * std::mem::size_of::<PriceSlot>()
    }

    fn build_index(symbols: &[String]) -> AHashMap<String, usize> {
        symbols.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect()
    }

    /// Create the region, reclaiming any stale one of the same name, and
    /// initialize every slot to `(symbol, 0.0, 0.0)`.
    #[cfg(target_os = "linux")]
    pub fn create(name: &str, symbols: &[String]) -> Result<Self, PulseError> {
        use std::ffi::CString;

        let total_size = Self::region_size(symbols.len());
        let c_name = CString::new(name)
            .map_err(|_| PulseError::Shm(format!("invalid shm name {name:?}")))?;

        // SAFETY: POSIX shm_open + ftruncate + mmap — standard IPC pattern.
        unsafe {
            // Stale-segment reclamation from a previous run.
            if libc::shm_unlink(c_name.as_ptr()) == 0 {
                warn!("reclaimed stale shm region '{name}'");
            }

            let fd = libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            );
            if fd < 0 {
                return Err(PulseError::Shm(format!(
                    "shm_open('{name}') failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            if libc::ftruncate(fd, total_size as libc::off_t) != 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(PulseError::Shm(format!("ftruncate('{name}') failed: {err}")));
            }

            let base = libc::mmap(
                std::ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if base == libc::MAP_FAILED {
                libc::shm_unlink(c_name.as_ptr());
                return Err(PulseError::Shm(format!(
                    "mmap('{name}') failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            let base = base as *mut u8;
            // Zeroed region means lock word unlocked and prices/timestamps 0.0.
            std::ptr::write_bytes(base, 0, total_size);

            let header = &mut *(base as *mut StoreHeader);
            header.slot_count = symbols.len() as u32;

            let slots = base.add(std::mem::size_of::<StoreHeader>()) as *mut PriceSlot;
            for (i, sym) in symbols.iter().enumerate() {
                (*slots.add(i)).symbol = symbol_to_bytes(sym);
            }

            info!("created shm region '{name}' ({} slots, {total_size} bytes)", symbols.len());
            Ok(Self {
                base,
                total_size,
                name: name.to_string(),
                symbol_index: Self::build_index(symbols),
                attached: AtomicBool::new(true),
            })
        }
    }

    /// Attach to an existing region by name without creating one.
    ///
    /// Fails with [`PulseError::ShmNotFound`] if the region does not yet
    /// exist — the expected race during multi-process startup. Callers
    /// retry via [`SharedPriceStore::attach_with_retry`].
    #[cfg(target_os = "linux")]
    pub fn attach(name: &str, symbols: &[String]) -> Result<Self, PulseError> {
        use std::ffi::CString;

        let total_size = Self::region_size(symbols.len());
        let c_name = CString::new(name)
            .map_err(|_| PulseError::Shm(format!("invalid shm name {name:?}")))?;

        // SAFETY: shm_open without O_CREAT + fstat size check + mmap.
        unsafe {
            let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o666);
            if fd < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ENOENT) {
                    return Err(PulseError::ShmNotFound(name.to_string()));
                }
                return Err(PulseError::Shm(format!("shm_open('{name}') failed: {err}")));
            }

            let mut st: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut st) != 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(PulseError::Shm(format!("fstat('{name}') failed: {err}")));
            }
            if (st.st_size as usize) < total_size {
                libc::close(fd);
                return Err(PulseError::Shm(format!(
                    "shm region '{name}' is {} bytes, expected {total_size} — \
                     creator and attacher instrument lists differ?",
                    st.st_size
                )));
            }

            let base = libc::mmap(
                std::ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if base == libc::MAP_FAILED {
                return Err(PulseError::Shm(format!(
                    "mmap('{name}') failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            info!("attached shm region '{name}' ({} slots)", symbols.len());
            Ok(Self {
                base: base as *mut u8,
                total_size,
                name: name.to_string(),
                symbol_index: Self::build_index(symbols),
                attached: AtomicBool::new(true),
            })
        }
    }

    /// Heap-backed stand-in for non-Linux development builds. The handle
    /// works within one process but nothing can attach to it.
    #[cfg(not(target_os = "linux"))]
    pub fn create(name: &str, symbols: &[String]) -> Result<Self, PulseError> {
        let total_size = Self::region_size(symbols.len());
        let layout = std::alloc::Layout::from_size_align(total_size, 8)
            .map_err(|e| PulseError::Shm(format!("layout error: {e}")))?;

        // SAFETY: zeroed allocation, initialized below before any reads.
        let base = unsafe {
            let ptr = std::alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                return Err(PulseError::Shm("allocation failed".into()));
            }
            ptr
        };

        unsafe {
            let header = &mut *(base as *mut StoreHeader);
            header.slot_count = symbols.len() as u32;
            let slots = base.add(std::mem::size_of::<StoreHeader>()) as *mut PriceSlot;
            for (i, sym) in symbols.iter().enumerate() {
                (*slots.add(i)).symbol = symbol_to_bytes(sym);
            }
        }

        Ok(Self {
            base,
            total_size,
            name: name.to_string(),
            symbol_index: Self::build_index(symbols),
            attached: AtomicBool::new(true),
        })
    }

    /// Cross-process attach requires POSIX shared memory.
    #[cfg(not(target_os = "linux"))]
    pub fn attach(name: &str, _symbols: &[String]) -> Result<Self, PulseError> {
        Err(PulseError::Shm(format!(
            "attach('{name}') requires POSIX shared memory (linux only)"
        )))
    }

    /// Attach with a fixed-delay, bounded retry for the creator/attacher
    /// startup race, failing hard once the budget is exhausted.
    pub fn attach_with_retry(
        name: &str,
        symbols: &[String],
        max_attempts: u32,
        delay: Duration,
    ) -> Result<Self, PulseError> {
        let mut attempt = 1;
        loop {
            match Self::attach(name, symbols) {
                Ok(store) => return Ok(store),
                Err(PulseError::ShmNotFound(_)) if attempt < max_attempts => {
                    warn!(
                        "shm region '{name}' not found (attempt {attempt}/{max_attempts}), \
                         waiting for creator"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Locked access
    // -----------------------------------------------------------------------

    fn header(&self) -> *mut StoreHeader {
        self.base as *mut StoreHeader
    }

    fn slots(&self) -> *mut PriceSlot {
        // SAFETY: the region is at least header + slot_count slots.
        unsafe { self.base.add(std::mem::size_of::<StoreHeader>()) as *mut PriceSlot }
    }

    fn lock_region(&self) -> RegionGuard<'_> {
        // SAFETY: header lives at the region base for the lifetime of the map.
        let lock = unsafe { &(*self.header()).lock };
        let mut spins = 0u32;
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins = spins.wrapping_add(1);
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
        RegionGuard { lock }
    }

    /// Overwrite a symbol's price and timestamp under the region lock.
    ///
    /// An unknown symbol is logged and ignored; returns whether the slot was
    /// written.
    pub fn update(&self, symbol: &str, price: f64, timestamp: f64) -> bool {
        if !self.attached.load(Ordering::Acquire) {
            error!("update on closed price store '{}'", self.name);
            return false;
        }
        let Some(&idx) = self.symbol_index.get(symbol) else {
            error!("symbol {symbol} not found in price store '{}'", self.name);
            return false;
        };
        let _guard = self.lock_region();
        // SAFETY: idx < slot_count by construction of symbol_index; the
        // region lock is held.
        unsafe {
            let slot = &mut *self.slots().add(idx);
            slot.price = price;
            slot.timestamp = timestamp;
        }
        true
    }

    /// Read a symbol's `(price, timestamp)` under the region lock.
    ///
    /// `None` is the not-found sentinel for unconfigured symbols.
    pub fn read(&self, symbol: &str) -> Option<(f64, f64)> {
        if !self.attached.load(Ordering::Acquire) {
            error!("read on closed price store '{}'", self.name);
            return None;
        }
        let Some(&idx) = self.symbol_index.get(symbol) else {
            error!("symbol {symbol} not found in price store '{}'", self.name);
            return None;
        };
        let _guard = self.lock_region();
        // SAFETY: as in `update`.
        let slot = unsafe { &*self.slots().add(idx) };
        Some((slot.price, slot.timestamp))
    }

    /// Snapshot every slot under one lock hold.
    pub fn read_all(&self) -> Vec<(String, f64, f64)> {
        if !self.attached.load(Ordering::Acquire) {
            error!("read_all on closed price store '{}'", self.name);
            return Vec::new();
        }
        let _guard = self.lock_region();
        (0..self.symbol_index.len())
            .map(|i| {
                // SAFETY: i < slot_count; the region lock is held.
                let slot = unsafe { &*self.slots().add(i) };
                (symbol_from_bytes(&slot.symbol).to_string(), slot.price, slot.timestamp)
            })
            .collect()
    }

    /// Symbols this handle indexes, in slot order.
    pub fn symbols(&self) -> Vec<String> {
        let mut syms: Vec<(usize, &String)> =
            self.symbol_index.iter().map(|(s, &i)| (i, s)).collect();
        syms.sort_by_key(|&(i, _)| i);
        syms.into_iter().map(|(_, s)| s.clone()).collect()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Detach this process's view of the region without destroying it.
    /// Idempotent — a second close is a no-op.
    pub fn close(&self) {
        if !self.attached.swap(false, Ordering::AcqRel) {
            return;
        }
        #[cfg(target_os = "linux")]
        // SAFETY: base/total_size are the exact mmap values; attached was set.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.total_size);
        }
        #[cfg(not(target_os = "linux"))]
        // SAFETY: same layout as the allocation in `create`.
        unsafe {
            if let Ok(layout) = std::alloc::Layout::from_size_align(self.total_size, 8) {
                std::alloc::dealloc(self.base, layout);
            }
        }
        info!("closed shm region '{}'", self.name);
    }

    /// Destroy the region. Only the creating process should call this, and
    /// only after all attached processes have closed.
    pub fn unlink(&self) {
        #[cfg(target_os = "linux")]
        {
            if let Ok(c_name) = std::ffi::CString::new(self.name.as_str()) {
                // SAFETY: plain shm_unlink by name; safe regardless of state.
                unsafe {
                    libc::shm_unlink(c_name.as_ptr());
                }
                info!("unlinked shm region '{}'", self.name);
            }
        }
    }
}

impl Drop for SharedPriceStore {
    fn drop(&mut self) {
        // Detach only — the region must survive for other processes.
        self.close();
    }
}

/// RAII guard for the in-region spinlock.
struct RegionGuard<'a> {
    lock: &'a AtomicU32,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(0, Ordering::Release);
    }
}
