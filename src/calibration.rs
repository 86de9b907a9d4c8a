// Calibration source for the motors
//
// A calibration slot holds the drive speed and compensation of one motor.
// Slot 0 is the left motor, slot 1 the right motor.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const CALIBRATION_SLOTS: usize = 2;
pub const LEFT_MOTOR_SLOT: usize = 0;
pub const RIGHT_MOTOR_SLOT: usize = 1;

/// Per-motor calibration values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub drive_speed: u8,
    pub compensation: u8,
}

/// Error types for calibration storage
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid calibration data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No calibration slot {slot} (have {CALIBRATION_SLOTS})")]
    InvalidSlot { slot: usize },
}

pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Where calibration values are read at startup and written back on change
pub trait CalibrationStore {
    /// Stored calibration of a slot, None if the slot was never written
    fn load(&mut self, slot: usize) -> Result<Option<Calibration>>;

    fn store(&mut self, slot: usize, calibration: Calibration) -> Result<()>;
}

fn check_slot(slot: usize) -> Result<()> {
    if slot >= CALIBRATION_SLOTS {
        return Err(CalibrationError::InvalidSlot { slot });
    }
    Ok(())
}

/// Calibration kept in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryCalibrationStore {
    slots: [Option<Calibration>; CALIBRATION_SLOTS],
}

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&mut self, slot: usize) -> Result<Option<Calibration>> {
        check_slot(slot)?;
        Ok(self.slots[slot])
    }

    fn store(&mut self, slot: usize, calibration: Calibration) -> Result<()> {
        check_slot(slot)?;
        self.slots[slot] = Some(calibration);
        Ok(())
    }
}

/// Calibration kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonCalibrationStore {
    path: PathBuf,
}

impl JsonCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_slots(&self) -> Result<[Option<Calibration>; CALIBRATION_SLOTS]> {
        match fs::read(&self.path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No calibration file at {}", self.path.display());
                Ok(Default::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn load(&mut self, slot: usize) -> Result<Option<Calibration>> {
        check_slot(slot)?;
        Ok(self.read_slots()?[slot])
    }

    fn store(&mut self, slot: usize, calibration: Calibration) -> Result<()> {
        check_slot(slot)?;
        let mut slots = self.read_slots()?;
        slots[slot] = Some(calibration);
        fs::write(&self.path, serde_json::to_string_pretty(&slots)?)?;
        info!(
            "Stored calibration slot {} to {}: {:?}",
            slot,
            self.path.display(),
            calibration
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pwm-car-calibration-{}-{}.json",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryCalibrationStore::new();
        assert_eq!(store.load(LEFT_MOTOR_SLOT).unwrap(), None);

        let calibration = Calibration {
            drive_speed: 100,
            compensation: 4,
        };
        store.store(RIGHT_MOTOR_SLOT, calibration).unwrap();
        assert_eq!(store.load(RIGHT_MOTOR_SLOT).unwrap(), Some(calibration));
        assert_eq!(store.load(LEFT_MOTOR_SLOT).unwrap(), None);
    }

    #[test]
    fn test_invalid_slot() {
        let mut store = MemoryCalibrationStore::new();
        assert!(matches!(
            store.load(2),
            Err(CalibrationError::InvalidSlot { slot: 2 })
        ));
        let mut file_store = JsonCalibrationStore::new(temp_path("invalid"));
        assert!(file_store.store(5, Calibration::default()).is_err());
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let mut store = JsonCalibrationStore::new(temp_path("missing"));
        assert_eq!(store.load(LEFT_MOTOR_SLOT).unwrap(), None);
    }

    #[test]
    fn test_json_store_keeps_other_slot() {
        let path = temp_path("slots");
        let _ = fs::remove_file(&path);
        let mut store = JsonCalibrationStore::new(&path);

        let left = Calibration {
            drive_speed: 90,
            compensation: 0,
        };
        let right = Calibration {
            drive_speed: 90,
            compensation: 6,
        };
        store.store(LEFT_MOTOR_SLOT, left).unwrap();
        store.store(RIGHT_MOTOR_SLOT, right).unwrap();

        let mut reopened = JsonCalibrationStore::new(&path);
        assert_eq!(reopened.load(LEFT_MOTOR_SLOT).unwrap(), Some(left));
        assert_eq!(reopened.load(RIGHT_MOTOR_SLOT).unwrap(), Some(right));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let path = temp_path("garbage");
        fs::write(&path, "not json").unwrap();
        let mut store = JsonCalibrationStore::new(&path);
        assert!(matches!(
            store.load(LEFT_MOTOR_SLOT),
            Err(CalibrationError::Json(_))
        ));
        fs::remove_file(&path).unwrap();
    }
}
