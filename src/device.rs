//! Remote-backed cached block device front-end.
//!
//! Serves sector-granular reads and writes against a local cache file
//! while the authoritative contents live on a page server. The cache
//! manager maps logical sectors to physical cache-file sectors; misses
//! are funnelled through a deduplicating fetch queue to one background
//! worker that speaks the wire protocol.
//!
//! ## Architecture
//!
//! ```text
//!   read/write(sector)
//!        │ lookup + pin (manager)
//!        ├─ hit  ──► cache file at physical << 9, then unpin
//!        └─ miss ──► fetch queue ──► worker ──► READ from server
//!                      ▲ (dedupe:                  │
//!                      │  one in-flight            ▼
//!                      │  fetch per sector)   cache file + insert
//!                      └──────── waiters retry lookup ◄┘
//! ```
//!
//! Physical sectors come from an explicit free stack seeded 0…C−1;
//! evicting a mapping recycles its physical sector. Dirty entries are
//! never evicted: when insertion finds nothing evictable, the worker
//! writes a batch of dirty sectors back to the server (WRITE), marks
//! them clean, and retries. `flush` drains every dirty sector, sends
//! FLUSH, and syncs the cache file; `discard` settles in-flight
//! fetches for the range, forwards DISCARD, punches holes locally, and
//! invalidates the mappings.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::client::PageClient;
use crate::error::{Error, Result};
use crate::fsutil::punch_hole;
use crate::manager::{CacheManager, CacheStats, InsertOutcome};
use crate::policy::lru::LruPolicy;
use crate::policy::EvictionPolicy;

/// Logical/physical sector size in bytes.
pub const SECTOR_SIZE: usize = 512;
/// log2 of [`SECTOR_SIZE`].
pub const SECTOR_SHIFT: u32 = 9;

const WRITEBACK_BATCH: usize = 16;
const RESOLVE_RETRY_LIMIT: usize = 8;

/// Front-end configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Local cache file; created (and sized to the capacity) if missing.
    pub cache_file: PathBuf,
    /// Page server host.
    pub remote_host: String,
    /// Page server port.
    pub remote_port: u16,
    /// Sectors to skip at the start of the remote device.
    pub offset_sectors: u64,
    /// Cache capacity in sectors.
    pub capacity_sectors: usize,
}

#[derive(Debug, Clone)]
enum FetchOutcome {
    Done,
    Failed(String),
}

/// Completion cell one or more waiters block on.
#[derive(Debug)]
struct FetchSlot {
    state: Mutex<Option<FetchOutcome>>,
    done: Condvar,
}

impl FetchSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: FetchOutcome) {
        *self.state.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> FetchOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut state);
        }
    }
}

#[derive(Debug, Default)]
struct FetchQueue {
    queue: VecDeque<u64>,
    pending: FxHashMap<u64, Arc<FetchSlot>>,
}

#[derive(Debug)]
struct DeviceShared<P: EvictionPolicy<u64, u64>> {
    cache_file: File,
    manager: CacheManager<u64, u64, P>,
    remote: Mutex<PageClient>,
    phys_free: Mutex<Vec<u64>>,
    fetches: Mutex<FetchQueue>,
    fetch_ready: Condvar,
    shutdown: AtomicBool,
    offset_sectors: u64,
    device_sectors: u64,
}

/// Cached block device over a page server. Defaults to LRU eviction.
#[derive(Debug)]
pub struct CachedDevice<P: EvictionPolicy<u64, u64> = LruPolicy> {
    shared: Arc<DeviceShared<P>>,
    worker: Option<JoinHandle<()>>,
}

impl<P> CachedDevice<P>
where
    P: EvictionPolicy<u64, u64> + Send + 'static,
    P::Meta: Send + 'static,
{
    /// Opens the cache file, connects to the page server, and starts
    /// the background fetcher.
    pub fn open(config: DeviceConfig) -> Result<Self> {
        if config.capacity_sectors == 0 {
            return Err(Error::Config("cache capacity must be at least one sector".into()));
        }
        let cache_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.cache_file)?;
        cache_file.set_len((config.capacity_sectors as u64) << SECTOR_SHIFT)?;

        let mut remote = PageClient::connect(&config.remote_host, config.remote_port)?;
        let stat = remote.stat()?;
        let total_sectors = stat.total_size >> SECTOR_SHIFT;
        if config.offset_sectors >= total_sectors {
            return Err(Error::Config(format!(
                "offset {} is beyond the remote device of {} sectors",
                config.offset_sectors, total_sectors
            )));
        }
        let device_sectors = total_sectors - config.offset_sectors;
        debug!(
            device_sectors,
            capacity = config.capacity_sectors,
            page_size = stat.page_size,
            "cached device opened"
        );

        let shared = Arc::new(DeviceShared {
            cache_file,
            manager: CacheManager::new(config.capacity_sectors),
            remote: Mutex::new(remote),
            phys_free: Mutex::new((0..config.capacity_sectors as u64).rev().collect()),
            fetches: Mutex::new(FetchQueue::default()),
            fetch_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
            offset_sectors: config.offset_sectors,
            device_sectors,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("sector-fetch".into())
            .spawn(move || fetch_worker(worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Usable device size in sectors.
    pub fn device_sectors(&self) -> u64 {
        self.shared.device_sectors
    }

    /// Cache statistics snapshot.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.manager.stats()
    }

    /// Reads whole sectors starting at `sector` into `buf`.
    pub fn read(&self, sector: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(sector, buf.len())?;
        for (i, chunk) in buf.chunks_mut(SECTOR_SIZE).enumerate() {
            let logical = sector + i as u64;
            let physical = self.resolve(logical)?;
            let io = self
                .shared
                .cache_file
                .read_exact_at(chunk, physical << SECTOR_SHIFT);
            self.shared.manager.unpin(&logical);
            io?;
        }
        Ok(())
    }

    /// Writes whole sectors starting at `sector` from `buf`. Written
    /// sectors are marked dirty until written back to the server.
    pub fn write(&self, sector: u64, buf: &[u8]) -> Result<()> {
        self.check_range(sector, buf.len())?;
        for (i, chunk) in buf.chunks(SECTOR_SIZE).enumerate() {
            let logical = sector + i as u64;
            let physical = self.resolve(logical)?;
            let io = self
                .shared
                .cache_file
                .write_all_at(chunk, physical << SECTOR_SHIFT);
            if io.is_ok() {
                self.shared.manager.mark_dirty(&logical);
            }
            self.shared.manager.unpin(&logical);
            io?;
        }
        Ok(())
    }

    /// Zero-fills `nsectors` starting at `sector`. Unlike
    /// [`discard`](Self::discard) the sectors stay mapped: they are
    /// zeroed in the cache file and marked dirty, so the zeroes reach
    /// the server on write-back.
    pub fn write_zeroes(&self, sector: u64, nsectors: u64) -> Result<()> {
        if nsectors == 0 {
            return Ok(());
        }
        let end = sector.checked_add(nsectors).filter(|end| *end <= self.shared.device_sectors);
        let end = match end {
            Some(end) => end,
            None => {
                return Err(Error::OutOfBounds {
                    offset: sector << SECTOR_SHIFT,
                    length: nsectors.saturating_mul(SECTOR_SIZE as u64).min(u32::MAX as u64) as u32,
                    size: self.shared.device_sectors << SECTOR_SHIFT,
                })
            },
        };
        let zeros = [0u8; SECTOR_SIZE];
        for logical in sector..end {
            let physical = self.resolve(logical)?;
            let io = self
                .shared
                .cache_file
                .write_all_at(&zeros, physical << SECTOR_SHIFT);
            if io.is_ok() {
                self.shared.manager.mark_dirty(&logical);
            }
            self.shared.manager.unpin(&logical);
            io?;
        }
        Ok(())
    }

    /// Writes every dirty sector back to the server, asks the server to
    /// sync, and syncs the local cache file.
    pub fn flush(&self) -> Result<()> {
        loop {
            if self.shared.write_back_dirty(WRITEBACK_BATCH)? == 0 {
                break;
            }
        }
        self.shared.with_remote(|remote| remote.flush())?;
        self.shared.cache_file.sync_data()?;
        Ok(())
    }

    /// Discards `nsectors` starting at `sector`: forwards DISCARD to
    /// the server, punches holes in the mapped cache-file regions, and
    /// invalidates the mappings.
    pub fn discard(&self, sector: u64, nsectors: u64) -> Result<()> {
        if nsectors == 0 {
            return Ok(());
        }
        let byte_len = nsectors
            .checked_mul(SECTOR_SIZE as u64)
            .filter(|len| *len <= u32::MAX as u64)
            .ok_or_else(|| Error::Config("discard range too large for one request".into()))?;
        let end = sector
            .checked_add(nsectors)
            .ok_or(Error::OutOfBounds {
                offset: sector << SECTOR_SHIFT,
                length: byte_len as u32,
                size: self.shared.device_sectors << SECTOR_SHIFT,
            })?;
        if end > self.shared.device_sectors {
            return Err(Error::OutOfBounds {
                offset: sector << SECTOR_SHIFT,
                length: byte_len as u32,
                size: self.shared.device_sectors << SECTOR_SHIFT,
            });
        }

        // settle in-flight fetches so a completion cannot resurrect a
        // mapping we are about to drop
        let pending: Vec<Arc<FetchSlot>> = {
            let fetches = self.shared.fetches.lock();
            fetches
                .pending
                .iter()
                .filter(|(key, _)| **key >= sector && **key < end)
                .map(|(_, slot)| Arc::clone(slot))
                .collect()
        };
        for slot in pending {
            let _ = slot.wait();
        }

        let remote_offset = (sector + self.shared.offset_sectors) << SECTOR_SHIFT;
        self.shared
            .with_remote(|remote| remote.discard(remote_offset, byte_len as u32))?;

        for logical in sector..end {
            if let Some(physical) = self.shared.manager.invalidate(&logical) {
                punch_hole(
                    &self.shared.cache_file,
                    physical << SECTOR_SHIFT,
                    SECTOR_SIZE as u64,
                )?;
                self.shared.phys_free.lock().push(physical);
            }
        }
        debug!(sector, nsectors, "discarded range");
        Ok(())
    }

    fn check_range(&self, sector: u64, byte_len: usize) -> Result<()> {
        if byte_len == 0 || byte_len % SECTOR_SIZE != 0 {
            return Err(Error::Config(
                "buffer must be a positive multiple of the sector size".into(),
            ));
        }
        let nsectors = (byte_len / SECTOR_SIZE) as u64;
        let in_range = sector
            .checked_add(nsectors)
            .is_some_and(|end| end <= self.shared.device_sectors);
        if !in_range {
            return Err(Error::OutOfBounds {
                offset: sector << SECTOR_SHIFT,
                length: byte_len as u32,
                size: self.shared.device_sectors << SECTOR_SHIFT,
            });
        }
        Ok(())
    }

    /// Maps a logical sector to its physical cache sector, fetching on
    /// a miss and waiting for the fetch to complete. Returns with the
    /// entry pinned; the caller unpins after dispatching its I/O, so
    /// eviction cannot recycle the physical sector mid-dispatch.
    fn resolve(&self, logical: u64) -> Result<u64> {
        for _ in 0..RESOLVE_RETRY_LIMIT {
            if let Some(physical) = self.shared.manager.lookup_pin(&logical) {
                return Ok(physical);
            }
            let slot = self.shared.request_fetch(logical);
            match slot.wait() {
                FetchOutcome::Done => continue, // mapping registered; retry the lookup
                FetchOutcome::Failed(reason) => {
                    return Err(Error::Fetch {
                        sector: logical,
                        reason,
                    })
                },
            }
        }
        Err(Error::Fetch {
            sector: logical,
            reason: "mapping kept disappearing under cache pressure".into(),
        })
    }
}

impl<P: EvictionPolicy<u64, u64>> Drop for CachedDevice<P> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.fetch_ready.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let _ = self.shared.cache_file.sync_data();
    }
}

impl<P: EvictionPolicy<u64, u64>> DeviceShared<P> {
    /// Registers interest in fetching `logical`, deduplicating against
    /// any fetch already pending for the same sector.
    fn request_fetch(&self, logical: u64) -> Arc<FetchSlot> {
        let mut fetches = self.fetches.lock();
        if let Some(slot) = fetches.pending.get(&logical) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(FetchSlot::new());
        fetches.pending.insert(logical, Arc::clone(&slot));
        fetches.queue.push_back(logical);
        self.fetch_ready.notify_one();
        trace!(logical, "fetch queued");
        slot
    }

    /// Runs `op` against the page server, reconnecting and retrying
    /// once if the connection dropped.
    fn with_remote<T>(&self, op: impl Fn(&mut PageClient) -> Result<T>) -> Result<T> {
        let mut remote = self.remote.lock();
        match op(&mut remote) {
            Err(Error::Disconnected) => {
                warn!("page server connection lost; reconnecting");
                remote.reconnect()?;
                op(&mut remote)
            },
            other => other,
        }
    }

    /// Writes up to `max` dirty sectors back to the server, marking
    /// them clean. Returns how many were written.
    fn write_back_dirty(&self, max: usize) -> Result<usize> {
        let dirty = self.manager.get_dirty(max);
        let mut written = 0usize;
        for logical in dirty {
            let physical = match self.manager.peek(&logical) {
                Some(physical) => physical,
                None => continue, // invalidated in the meantime
            };
            let mut buf = [0u8; SECTOR_SIZE];
            self.cache_file
                .read_exact_at(&mut buf, physical << SECTOR_SHIFT)?;
            let remote_offset = (logical + self.offset_sectors) << SECTOR_SHIFT;
            self.with_remote(|remote| remote.write(remote_offset, &buf))?;
            self.manager.mark_clean(&logical);
            written += 1;
        }
        if written > 0 {
            trace!(written, "dirty sectors written back");
        }
        Ok(written)
    }

    /// Takes a physical sector from the free pool, evicting a clean
    /// mapping or writing back dirty ones if the pool is dry.
    fn alloc_physical(&self) -> Result<u64> {
        for _ in 0..RESOLVE_RETRY_LIMIT {
            if let Some(physical) = self.phys_free.lock().pop() {
                return Ok(physical);
            }
            if let Some((_, physical)) = self.manager.evict_one() {
                return Ok(physical);
            }
            if self.write_back_dirty(WRITEBACK_BATCH)? == 0 {
                // nothing evictable and nothing to write back: give any
                // in-flight dispatch a chance to drop its pin
                thread::yield_now();
            }
        }
        Err(Error::CacheFull)
    }

    /// Fetches one sector from the server into the cache file and
    /// registers the mapping.
    fn fetch_one(&self, logical: u64) -> Result<()> {
        let remote_offset = (logical + self.offset_sectors) << SECTOR_SHIFT;
        let data = self.with_remote(|remote| remote.read(remote_offset, SECTOR_SIZE as u32))?;
        if data.len() < SECTOR_SIZE {
            return Err(Error::Fetch {
                sector: logical,
                reason: format!("server returned {} of {} bytes", data.len(), SECTOR_SIZE),
            });
        }

        let physical = self.alloc_physical()?;
        self.cache_file
            .write_all_at(&data, physical << SECTOR_SHIFT)?;

        for _ in 0..RESOLVE_RETRY_LIMIT {
            match self.manager.insert_full(logical, physical) {
                InsertOutcome::Inserted { evicted } => {
                    if let Some((_, old_physical)) = evicted {
                        self.phys_free.lock().push(old_physical);
                    }
                    trace!(logical, physical, "sector cached");
                    return Ok(());
                },
                InsertOutcome::AlreadyPresent => {
                    // a concurrent path registered the sector first
                    self.phys_free.lock().push(physical);
                    return Ok(());
                },
                InsertOutcome::CapacityExhausted => {
                    if self.write_back_dirty(WRITEBACK_BATCH)? == 0 {
                        thread::yield_now();
                    }
                },
            }
        }
        self.phys_free.lock().push(physical);
        Err(Error::CacheFull)
    }
}

/// Background fetcher: drains the queue until shutdown.
fn fetch_worker<P: EvictionPolicy<u64, u64>>(shared: Arc<DeviceShared<P>>) {
    loop {
        let logical = {
            let mut fetches = shared.fetches.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    // fail any waiters so nothing blocks forever
                    fetches.queue.clear();
                    for (_, slot) in fetches.pending.drain() {
                        slot.complete(FetchOutcome::Failed("device shutting down".into()));
                    }
                    return;
                }
                if let Some(logical) = fetches.queue.pop_front() {
                    break logical;
                }
                shared.fetch_ready.wait(&mut fetches);
            }
        };

        let result = shared.fetch_one(logical);
        let slot = shared.fetches.lock().pending.remove(&logical);
        if let Some(slot) = slot {
            match result {
                Ok(()) => slot.complete(FetchOutcome::Done),
                Err(err) => {
                    warn!(logical, error = %err, "fetch failed");
                    slot.complete(FetchOutcome::Failed(err.to_string()));
                },
            }
        }
    }
}
