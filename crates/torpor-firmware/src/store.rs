//! CSV sample log on the SD card

use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{error, info};
use torpor_core::datalog::{self, CSV_HEADER};
use torpor_core::error::StoreError;
use torpor_core::hal::{Reading, ReadingStore};

/// 8.3 name, the only form embedded-sdmmc opens
pub const LOG_FILE: &str = "DATALOG.CSV";

/// FAT modification times are not tracked; every row carries its own timestamp.
pub struct FixedTimestamps;

impl TimeSource for FixedTimestamps {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// SD card operations are blocking, as are the display's on the same bus.
pub struct SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
        }
    }

    /// Append `bytes` to the log file, writing the header first if the file is new
    fn append_bytes(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| log_failure("open volume", e, StoreError::NotMounted))?;
        let root_dir = volume0
            .open_root_dir()
            .map_err(|e| log_failure("open root", e, io("open root directory")))?;
        let file = root_dir
            .open_file_in_dir(LOG_FILE, Mode::ReadWriteCreateOrAppend)
            .map_err(|e| log_failure("open log", e, io("open log file")))?;

        if file.length() == 0 {
            info!("Starting new {}", LOG_FILE);
            file.write(CSV_HEADER.as_bytes())
                .map_err(|e| log_failure("write header", e, io("write header")))?;
        }
        if !bytes.is_empty() {
            file.write(bytes)
                .map_err(|e| log_failure("write row", e, io("write row")))?;
        }

        // Closing flushes the FAT entry; dropping alone would lose the new length
        file.close()
            .map_err(|e| log_failure("close log", e, io("close log file")))?;
        root_dir
            .close()
            .map_err(|e| log_failure("close root", e, io("close root directory")))?;
        volume0
            .close()
            .map_err(|e| log_failure("close volume", e, io("close volume")))?;
        Ok(())
    }

    /// Read from `offset` into `buf`; a missing log reads as empty
    fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<usize, StoreError> {
        let Ok(offset) = u32::try_from(offset) else {
            return Ok(0);
        };
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| log_failure("open volume", e, StoreError::NotMounted))?;
        let root_dir = volume0
            .open_root_dir()
            .map_err(|e| log_failure("open root", e, io("open root directory")))?;
        let file = match root_dir.open_file_in_dir(LOG_FILE, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(0),
            Err(e) => return Err(log_failure("open log", e, io("open log file"))),
        };

        if offset >= file.length() {
            return Ok(0);
        }
        file.seek_from_start(offset)
            .map_err(|e| log_failure("seek log", e, io("seek log file")))?;
        file.read(buf)
            .map_err(|e| log_failure("read log", e, io("read log file")))
    }
}

impl<S, D, T> ReadingStore for SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Mount the card and make sure the log file exists with its header
    async fn init(&mut self) -> Result<(), StoreError> {
        self.append_bytes(&[])
    }

    async fn append(&mut self, timestamp: &str, reading: &Reading) -> Result<(), StoreError> {
        let row = datalog::format_row(timestamp, reading)?;
        self.append_bytes(row.as_bytes())
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.read_bytes(offset, buf)
    }
}

fn io(operation: &'static str) -> StoreError {
    StoreError::Io { operation }
}

fn log_failure(
    step: &str,
    e: embedded_sdmmc::Error<SdCardError>,
    mapped: StoreError,
) -> StoreError {
    error!("SD card {} failed: {:?}", step, e);
    mapped
}
