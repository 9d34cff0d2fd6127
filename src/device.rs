//! Device controller — thin wrappers over [`crate::bus::BusClient`], each
//! packing a specific opcode, issuing the request, and validating the
//! response. Every wrapper fails fast on a protocol mismatch; nothing here
//! retries.

use log::debug;

use crate::bus::BusClient;
use crate::error::LcError;
use crate::register::{self, BLOCK_XFER, DEVINIT, DEVPROBE, DEVPROBE_BITMAP_WIDTH, POWER_OFF, POWER_ON, XFER_READ, XFER_WRITE};

/// Logical block size in bytes — the atomic unit of bus transfer and the
/// filesystem's logical block size.
pub const BLOCK_SIZE: usize = 256;

/// Small integer identifying one device within the 17-bit DEVPROBE bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u8);

/// One remote block-storage endpoint and its allocation cursor.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub num_sec: u16,
    pub num_blk: u16,
    pub next_sec: u16,
    pub next_blk: u16,
    pub full: bool,
}

impl Device {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            num_sec: 0,
            num_blk: 0,
            next_sec: 0,
            next_blk: 0,
            full: false,
        }
    }
}

/// `(dev, sec, blk)` — uniquely identifies one block on the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress {
    pub dev: DeviceId,
    pub sec: u16,
    pub blk: u16,
}

fn check_response(fields: register::RegisterFields, expected_opcode: u8, context: &str) -> Result<(), LcError> {
    if !fields.is_success() {
        return Err(LcError::Protocol(format!("{context}: server signalled an error")));
    }
    if fields.c0 != expected_opcode {
        return Err(LcError::Protocol(format!(
            "{context}: expected opcode {expected_opcode}, got {}",
            fields.c0
        )));
    }
    Ok(())
}

/// Power on the device cluster.
pub fn power_on(bus: &mut BusClient) -> Result<(), LcError> {
    let req = register::pack(0, 0, POWER_ON, 0, 0, 0, 0);
    let resp = bus.bus_request(req, &mut [])?;
    check_response(register::unpack(resp), POWER_ON, "power_on")
}

/// Power off the device cluster. The bus client closes the socket and
/// releases any cipher state as part of handling this opcode.
pub fn power_off(bus: &mut BusClient) -> Result<(), LcError> {
    let req = register::pack(0, 0, POWER_OFF, 0, 0, 0, 0);
    let resp = bus.bus_request(req, &mut [])?;
    check_response(register::unpack(resp), POWER_OFF, "power_off")
}

/// Probe for present devices. Bits of the response `d0` are enumerated from
/// bit 16 down to bit 0 — the highest-numbered present device is discovered
/// (and therefore allocated from) first. This ordering is load-bearing: it
/// is also the order [`crate::filesystem`] allocates blocks in.
pub fn devprobe(bus: &mut BusClient) -> Result<Vec<Device>, LcError> {
    let req = register::pack(0, 0, DEVPROBE, 0, 0, 0, 0);
    let resp = bus.bus_request(req, &mut [])?;
    let fields = register::unpack(resp);
    check_response(fields, DEVPROBE, "devprobe")?;

    let mut devices = Vec::new();
    for bit in (0..DEVPROBE_BITMAP_WIDTH).rev() {
        if (fields.d0 as u32 >> bit) & 1 == 1 {
            debug!("devprobe: discovered device {bit}");
            devices.push(Device::new(DeviceId(bit as u8)));
        }
    }
    Ok(devices)
}

/// Initialize one device, recording its sector/block counts.
pub fn devinit(bus: &mut BusClient, dev: &mut Device) -> Result<(), LcError> {
    let req = register::pack(0, 0, DEVINIT, dev.id.0, 0, 0, 0);
    let resp = bus.bus_request(req, &mut [])?;
    let fields = register::unpack(resp);
    check_response(fields, DEVINIT, "devinit")?;
    if fields.c2 != dev.id.0 {
        return Err(LcError::Protocol(format!(
            "devinit: expected device id {} echoed in c2, got {}",
            dev.id.0, fields.c2
        )));
    }
    dev.num_sec = fields.d0;
    dev.num_blk = fields.d1;
    dev.next_sec = 0;
    dev.next_blk = 0;
    dev.full = false;
    Ok(())
}

/// Read one block into `buf` (must be exactly `BLOCK_SIZE` bytes).
pub fn read_bus(bus: &mut BusClient, buf: &mut [u8], addr: BlockAddress) -> Result<(), LcError> {
    debug_assert_eq!(buf.len(), BLOCK_SIZE);
    let req = register::pack(0, 0, BLOCK_XFER, addr.dev.0, XFER_READ, addr.sec, addr.blk);
    let resp = bus.bus_request(req, buf)?;
    check_response(register::unpack(resp), BLOCK_XFER, "read_bus")
}

/// Write one block from `buf` (must be exactly `BLOCK_SIZE` bytes).
pub fn write_bus(bus: &mut BusClient, buf: &mut [u8], addr: BlockAddress) -> Result<(), LcError> {
    debug_assert_eq!(buf.len(), BLOCK_SIZE);
    let req = register::pack(0, 0, BLOCK_XFER, addr.dev.0, XFER_WRITE, addr.sec, addr.blk);
    let resp = bus.bus_request(req, buf)?;
    check_response(register::unpack(resp), BLOCK_XFER, "write_bus")
}
