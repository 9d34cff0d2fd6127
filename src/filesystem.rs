//! Filesystem layer — the public `open/read/write/seek/close/shutdown` API,
//! layered over the block cache and device controller.
//!
//! [`Session`] bundles the file table, device list, power flag, cache, and
//! bus client into one value, replacing the five process-wide globals
//! (`files`, `devices`, `filec`, `devc`, `pwr`) of the original C
//! implementation. A `Session` is not `Sync`; an embedder sharing one across
//! threads must wrap it in a `Mutex` covering the whole file table, cache,
//! and bus client together — splitting the lock finer than that reintroduces
//! the races the single global `pwr` flag already had in the original.

use log::{debug, info};

use crate::cache::Cache;
use crate::config::ClientConfig;
use crate::bus::BusClient;
use crate::device::{self, BlockAddress, Device, BLOCK_SIZE};
use crate::error::{LcError, LcResult, StateError};

/// Matches the original C `LcFHandle` typedef (a plain file descriptor-style
/// index). Never negative in practice, but kept `i32` for API fidelity.
pub type LcFHandle = i32;

struct File {
    path: String,
    handle: LcFHandle,
    pos: usize,
    size: usize,
    blocks: Vec<BlockAddress>,
    open: bool,
}

/// The number of blocks a read or write of `len` bytes starting at `pos`
/// touches: `ceil((pos % BLOCK_SIZE + len) / BLOCK_SIZE)`.
///
/// The original C source computes this as `(pos % BLOCK_SIZE + len +
/// BLOCK_SIZE) / BLOCK_SIZE`, which over-counts by one whenever `pos %
/// BLOCK_SIZE + len` is itself a multiple of `BLOCK_SIZE` — a documented
/// open question this port resolves by using the correct ceiling formula.
fn blocks_touched(pos: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let offset = pos % BLOCK_SIZE;
    (offset + len + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// A session over a device cluster: the open-file table, the probed device
/// list, the block cache, and the bus connection that reaches them.
pub struct Session {
    bus: BusClient,
    files: Vec<File>,
    devices: Vec<Device>,
    cache: Option<Cache>,
    cache_capacity: usize,
    powered: bool,
}

impl Session {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            bus: BusClient::new(config),
            files: Vec::new(),
            devices: Vec::new(),
            cache: None,
            cache_capacity: config.cache_capacity,
            powered: false,
        }
    }

    fn file_index(&self, fh: LcFHandle) -> LcResult<usize> {
        let idx = usize::try_from(fh).map_err(|_| LcError::State(StateError::UnknownHandle(fh)))?;
        match self.files.get(idx) {
            Some(f) if f.open => Ok(idx),
            _ => Err(LcError::State(StateError::UnknownHandle(fh))),
        }
    }

    fn require_powered(&self) -> LcResult<()> {
        if self.powered {
            Ok(())
        } else {
            Err(LcError::State(StateError::PoweredOff))
        }
    }

    /// Assign `count` fresh blocks to `file`, scanning devices in probe
    /// order for the first non-full one and advancing its cursor — no
    /// rebalancing, exactly as the original `block_assign_helper`.
    fn allocate_blocks(&mut self, count: usize) -> LcResult<Vec<BlockAddress>> {
        let mut assigned = Vec::with_capacity(count);
        for _ in 0..count {
            let dev = self
                .devices
                .iter_mut()
                .find(|d| !d.full)
                .ok_or_else(|| LcError::Resource("no non-full device remains in the cluster".to_string()))?;

            let addr = BlockAddress { dev: dev.id, sec: dev.next_sec, blk: dev.next_blk };
            dev.next_blk += 1;
            if dev.next_blk == dev.num_blk {
                dev.next_sec += 1;
                dev.next_blk = 0;
            }
            if dev.next_sec == dev.num_sec {
                dev.full = true;
            }
            assigned.push(addr);
        }
        Ok(assigned)
    }

    fn fetch_block(&mut self, addr: BlockAddress) -> LcResult<[u8; BLOCK_SIZE]> {
        let cache = self.cache.as_mut().expect("cache initialized once powered on");
        if let Some(cached) = cache.get(addr) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(cached);
            return Ok(block);
        }
        let mut block = [0u8; BLOCK_SIZE];
        device::read_bus(&mut self.bus, &mut block, addr)?;
        self.cache.as_mut().unwrap().put(addr, &block);
        Ok(block)
    }

    /// Like [`Session::fetch_block`], but a read-miss is not inserted into
    /// the cache: the write path is about to overlay and `put` the whole
    /// block itself, so caching the pre-overlay bytes here would just be an
    /// extra, immediately-stale insert.
    fn fetch_block_for_overwrite(&mut self, addr: BlockAddress) -> LcResult<[u8; BLOCK_SIZE]> {
        let cache = self.cache.as_mut().expect("cache initialized once powered on");
        if let Some(cached) = cache.get(addr) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(cached);
            return Ok(block);
        }
        let mut block = [0u8; BLOCK_SIZE];
        device::read_bus(&mut self.bus, &mut block, addr)?;
        Ok(block)
    }

    /// Open `path` for reading and writing. Returns the existing handle if
    /// the path was previously opened and later closed; errors if it is
    /// currently open. Powers on the cluster, probes and initializes every
    /// device, and allocates the cache on the first open after a cold start
    /// or a prior [`Session::shutdown`].
    pub fn open(&mut self, path: &str) -> LcResult<LcFHandle> {
        if self.files.iter().any(|f| f.path == path && f.open) {
            return Err(LcError::State(StateError::AlreadyOpen(path.to_string())));
        }

        if !self.powered {
            device::power_on(&mut self.bus)?;
            self.powered = true;

            let mut devices = device::devprobe(&mut self.bus)?;
            for dev in devices.iter_mut() {
                device::devinit(&mut self.bus, dev)?;
            }
            self.devices = devices;
            self.cache = Some(Cache::new(self.cache_capacity));
            info!("session: powered on, {} device(s) present", self.devices.len());
        }

        if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
            existing.open = true;
            return Ok(existing.handle);
        }

        let handle = self.files.len() as LcFHandle;
        self.files.push(File {
            path: path.to_string(),
            handle,
            pos: 0,
            size: 0,
            blocks: Vec::new(),
            open: true,
        });
        debug!("session: opened new file {path:?} as handle {handle}");
        Ok(handle)
    }

    /// Read up to `buf.len()` bytes at the current position into `buf`,
    /// advancing the position.
    ///
    /// Matches the original `lcread`: `buf` is zero-filled up front, the
    /// read is silently truncated at EOF, and the return value is still
    /// `buf.len()` rather than the number of bytes actually copied — a
    /// preserved quirk of the reference implementation, not a bug
    /// introduced by this port. Callers who need the true count should
    /// compare the file's size against the position before calling.
    pub fn read(&mut self, fh: LcFHandle, buf: &mut [u8]) -> LcResult<usize> {
        let idx = self.file_index(fh)?;
        self.require_powered()?;

        buf.fill(0);
        let requested = buf.len();
        let start_pos = self.files[idx].pos;
        let available = self.files[idx].size.saturating_sub(start_pos);
        let mut remaining = requested.min(available);
        let touched = blocks_touched(start_pos, remaining);
        let mut blocks_seen = 0usize;
        let mut written = 0usize;

        while remaining > 0 {
            let pos = self.files[idx].pos;
            let block_index = pos / BLOCK_SIZE;
            let block_pos = pos % BLOCK_SIZE;
            let addr = self.files[idx].blocks[block_index];

            let block = self.fetch_block(addr)?;
            let chunk = remaining.min(BLOCK_SIZE - block_pos);
            buf[written..written + chunk].copy_from_slice(&block[block_pos..block_pos + chunk]);

            self.files[idx].pos += chunk;
            written += chunk;
            remaining -= chunk;
            blocks_seen += 1;
            debug!("read: block {addr:?} contributed {chunk} byte(s)");
        }
        debug_assert_eq!(blocks_seen, touched, "read must touch exactly ceil((pos%BLOCK_SIZE+L)/BLOCK_SIZE) blocks");

        Ok(requested)
    }

    /// Write `buf` at the current position, extending the file and
    /// allocating new blocks as needed, advancing the position.
    pub fn write(&mut self, fh: LcFHandle, buf: &[u8]) -> LcResult<usize> {
        let idx = self.file_index(fh)?;
        self.require_powered()?;

        let len = buf.len();
        let end_pos = self.files[idx].pos + len;
        let blocks_needed = (end_pos + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let have = self.files[idx].blocks.len();
        if blocks_needed > have {
            let fresh = self.allocate_blocks(blocks_needed - have)?;
            self.files[idx].blocks.extend(fresh);
        }

        let mut remaining = len;
        let mut consumed = 0usize;

        while remaining > 0 {
            let pos = self.files[idx].pos;
            let block_index = pos / BLOCK_SIZE;
            let block_pos = pos % BLOCK_SIZE;
            let addr = self.files[idx].blocks[block_index];

            let mut block = self.fetch_block_for_overwrite(addr)?;
            let chunk = remaining.min(BLOCK_SIZE - block_pos);
            block[block_pos..block_pos + chunk].copy_from_slice(&buf[consumed..consumed + chunk]);

            device::write_bus(&mut self.bus, &mut block, addr)?;
            self.cache.as_mut().unwrap().put(addr, &block);

            self.files[idx].pos += chunk;
            consumed += chunk;
            remaining -= chunk;
            debug!("write: block {addr:?} absorbed {chunk} byte(s)");
        }

        if self.files[idx].pos > self.files[idx].size {
            self.files[idx].size = self.files[idx].pos;
        }
        Ok(len)
    }

    /// Move the file position to `off`, which must not exceed the file's
    /// current size. Returns the new position.
    pub fn seek(&mut self, fh: LcFHandle, off: usize) -> LcResult<usize> {
        let idx = self.file_index(fh)?;
        let size = self.files[idx].size;
        if off > size {
            return Err(LcError::State(StateError::SeekPastEof { off, size }));
        }
        self.files[idx].pos = off;
        Ok(off)
    }

    /// Close the handle. The file's blocks and content are untouched; a
    /// later `open` of the same path reopens the same handle and data.
    pub fn close(&mut self, fh: LcFHandle) -> LcResult<()> {
        let idx = self.file_index(fh)?;
        self.files[idx].open = false;
        Ok(())
    }

    /// Power off the device cluster, clear the file table and device list,
    /// and drop the cache (logging its final hit/miss statistics).
    ///
    /// Shutting down a cluster that is already powered off is distinguished
    /// from a transport or protocol failure during the `power_off` bus
    /// call — the original C `lcshutdown` returns `-1` for both, making
    /// them indistinguishable to the caller.
    pub fn shutdown(&mut self) -> LcResult<()> {
        if !self.powered {
            return Err(LcError::State(StateError::AlreadyShutdown));
        }

        self.devices.clear();
        self.files.clear();
        self.cache = None; // Cache::drop logs final hit/miss/ratio.

        device::power_off(&mut self.bus)?;
        self.powered = false;
        info!("session: powered off");
        Ok(())
    }
}
