//! ATA PIO driver, primary channel.
//!
//! Polled 28-bit LBA transfers; no DMA, no IRQ completion. Waits are
//! bounded by a spin counter and a failed transfer is retried once
//! before surfacing EIO.

use alloc::sync::Arc;

use crate::arch::x86_64::asm::{inb, inw, outb, outw};
use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::SECTOR_SIZE;

use super::block::{check_range, BlockDevice};

const ATA_DATA: u16 = 0x1F0;
const ATA_ERROR: u16 = 0x1F1;
const ATA_COUNT: u16 = 0x1F2;
const ATA_LBA_LOW: u16 = 0x1F3;
const ATA_LBA_MID: u16 = 0x1F4;
const ATA_LBA_HIGH: u16 = 0x1F5;
const ATA_DRIVE: u16 = 0x1F6;
const ATA_STATUS: u16 = 0x1F7;
const ATA_CMD: u16 = 0x1F7;

const CMD_READ: u8 = 0x20;
const CMD_WRITE: u8 = 0x30;
const CMD_FLUSH: u8 = 0xE7;
const CMD_IDENTIFY: u8 = 0xEC;

const STATUS_ERR: u8 = 1 << 0;
const STATUS_DRQ: u8 = 1 << 3;
const STATUS_DF: u8 = 1 << 5;
const STATUS_BSY: u8 = 1 << 7;

/// Spin bound for one status transition.
const SPIN_LIMIT: u32 = 1_000_000;

/// The primary-master disk. The lock serializes the channel's port
/// protocol; requests are whole before the lock drops.
pub struct AtaDisk {
    channel: Spinlock<()>,
    nsectors: u32,
}

fn wait_not_busy() -> Result<u8> {
    for _ in 0..SPIN_LIMIT {
        // SAFETY: status port read has no side effect we care about.
        let status = unsafe { inb(ATA_STATUS) };
        if status & STATUS_BSY == 0 {
            if status & (STATUS_ERR | STATUS_DF) != 0 {
                return Err(Errno::EIO);
            }
            return Ok(status);
        }
        core::hint::spin_loop();
    }
    Err(Errno::EIO)
}

fn wait_data_ready() -> Result<()> {
    for _ in 0..SPIN_LIMIT {
        // SAFETY: as above.
        let status = unsafe { inb(ATA_STATUS) };
        if status & (STATUS_ERR | STATUS_DF) != 0 {
            return Err(Errno::EIO);
        }
        if status & STATUS_BSY == 0 && status & STATUS_DRQ != 0 {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(Errno::EIO)
}

/// Program the taskfile for a `count`-sector transfer at `lba`.
unsafe fn select(lba: u32, count: u8, cmd: u8) -> Result<()> {
    wait_not_busy()?;
    // SAFETY: standard ATA taskfile programming on the primary channel.
    unsafe {
        outb(ATA_DRIVE, 0xE0 | ((lba >> 24) as u8 & 0x0F));
        outb(ATA_COUNT, count);
        outb(ATA_LBA_LOW, lba as u8);
        outb(ATA_LBA_MID, (lba >> 8) as u8);
        outb(ATA_LBA_HIGH, (lba >> 16) as u8);
        outb(ATA_CMD, cmd);
    }
    Ok(())
}

impl AtaDisk {
    /// Probe the primary master. Returns `None` when nothing answers
    /// IDENTIFY.
    pub fn probe() -> Option<Arc<Self>> {
        // SAFETY: IDENTIFY on an empty channel only floats the bus.
        unsafe {
            outb(ATA_DRIVE, 0xE0);
            outb(ATA_COUNT, 0);
            outb(ATA_LBA_LOW, 0);
            outb(ATA_LBA_MID, 0);
            outb(ATA_LBA_HIGH, 0);
            outb(ATA_CMD, CMD_IDENTIFY);
            if inb(ATA_STATUS) == 0 {
                return None;
            }
        }
        wait_data_ready().ok()?;

        let mut ident = [0u16; 256];
        for w in ident.iter_mut() {
            // SAFETY: DRQ is set; the device expects 256 word reads.
            *w = unsafe { inw(ATA_DATA) };
        }
        // Words 60..61: total addressable sectors in LBA28 mode.
        let nsectors = ident[60] as u32 | ((ident[61] as u32) << 16);
        log::info!("ata: primary master, {} sectors", nsectors);
        Some(Arc::new(Self {
            channel: Spinlock::new("ATA0", ()),
            nsectors,
        }))
    }

    fn read_once(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let count = buf.len() / SECTOR_SIZE;
        let _chan = self.channel.lock();
        // SAFETY: channel lock held.
        unsafe { select(lba, count as u8, CMD_READ)? };
        for sector in buf.chunks_exact_mut(SECTOR_SIZE) {
            wait_data_ready()?;
            for pair in sector.chunks_exact_mut(2) {
                // SAFETY: DRQ set; device expects word-sized reads.
                let w = unsafe { inw(ATA_DATA) };
                pair[0] = w as u8;
                pair[1] = (w >> 8) as u8;
            }
        }
        Ok(())
    }

    fn write_once(&self, lba: u32, buf: &[u8]) -> Result<()> {
        let count = buf.len() / SECTOR_SIZE;
        let _chan = self.channel.lock();
        // SAFETY: channel lock held.
        unsafe { select(lba, count as u8, CMD_WRITE)? };
        for sector in buf.chunks_exact(SECTOR_SIZE) {
            wait_data_ready()?;
            for pair in sector.chunks_exact(2) {
                let w = pair[0] as u16 | ((pair[1] as u16) << 8);
                // SAFETY: DRQ set; device expects word-sized writes.
                unsafe { outw(ATA_DATA, w) };
            }
        }
        // SAFETY: flush is a no-data command.
        unsafe { outb(ATA_CMD, CMD_FLUSH) };
        wait_not_busy()?;
        Ok(())
    }
}

impl BlockDevice for AtaDisk {
    fn read_sectors(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let _ = check_range(self, lba, buf.len())?;
        self.read_once(lba, buf).or_else(|_| {
            log::warn!("ata: read {} failed, retrying", lba);
            self.read_once(lba, buf)
        })
    }

    fn write_sectors(&self, lba: u32, buf: &[u8]) -> Result<()> {
        let _ = check_range(self, lba, buf.len())?;
        self.write_once(lba, buf).or_else(|_| {
            log::warn!("ata: write {} failed, retrying", lba);
            self.write_once(lba, buf)
        })
    }

    fn nsectors(&self) -> u32 {
        self.nsectors
    }
}
