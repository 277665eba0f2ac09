//! Linux sysfs GPIO lines
//!
//! Layout under the sysfs root (default `/sys/class/gpio`):
//! - `export` - write the BCM line number to create `gpio<N>/`
//! - `gpio<N>/direction` - `in` or `out`
//! - `gpio<N>/value` - `0` or `1`
//!
//! Also assembles the full pin set for the door from configuration.

use crate::infra::config::Config;
use crate::io::hardware::HardwareError;
use crate::io::sim::{SimInput, SimOutput};
use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Time for udev to apply permissions after export
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

/// Error from a sysfs value file
#[derive(Debug)]
pub struct SysfsError(pub io::Error);

impl digital::Error for SysfsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One exported GPIO line
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `pin` (if needed) and set its direction
    pub fn open(root: &Path, pin: u32, direction: Direction) -> Result<Self, HardwareError> {
        let line_dir = root.join(format!("gpio{pin}"));
        let setup_err = |source| HardwareError::Setup { pin, source };

        if !line_dir.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(setup_err)?;
            std::thread::sleep(EXPORT_SETTLE);
            debug!(pin = %pin, "gpio_exported");
        }

        fs::write(line_dir.join("direction"), direction.as_str()).map_err(setup_err)?;

        Ok(Self { pin, value_path: line_dir.join("value") })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn read_value(&self) -> Result<bool, SysfsError> {
        let raw = fs::read_to_string(&self.value_path).map_err(SysfsError)?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(SysfsError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected value {other:?}"),
            ))),
        }
    }

    fn write_value(&self, high: bool) -> Result<(), SysfsError> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(SysfsError)
    }
}

impl ErrorType for SysfsPin {
    type Error = SysfsError;
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.read_value()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.read_value().map(|high| !high)
    }
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_value(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_value(true)
    }
}

/// Every line the door controller touches
pub struct DoorPins<I, O> {
    pub outer_sensor: I,
    pub inner_sensor: I,
    /// Motor phase lines A, B, C, D
    pub motor: [O; 4],
    /// Light relay (active low)
    pub relay: O,
}

impl DoorPins<SysfsPin, SysfsPin> {
    /// Export and configure all lines named in the config
    pub fn open_sysfs(config: &Config) -> Result<Self, HardwareError> {
        let root = Path::new(config.sysfs_root());
        let [a, b, c, d] = config.motor_pins();

        let pins = Self {
            outer_sensor: SysfsPin::open(root, config.outer_sensor_pin(), Direction::In)?,
            inner_sensor: SysfsPin::open(root, config.inner_sensor_pin(), Direction::In)?,
            motor: [
                SysfsPin::open(root, a, Direction::Out)?,
                SysfsPin::open(root, b, Direction::Out)?,
                SysfsPin::open(root, c, Direction::Out)?,
                SysfsPin::open(root, d, Direction::Out)?,
            ],
            relay: SysfsPin::open(root, config.relay_pin(), Direction::Out)?,
        };

        info!(
            root = %root.display(),
            outer = %config.outer_sensor_pin(),
            inner = %config.inner_sensor_pin(),
            motor = ?config.motor_pins(),
            relay = %config.relay_pin(),
            "gpio_lines_ready"
        );
        Ok(pins)
    }
}

/// Caller-side handles for a simulated pin set
#[derive(Debug, Clone)]
pub struct SimTaps {
    pub outer_sensor: SimInput,
    pub inner_sensor: SimInput,
    pub motor: [SimOutput; 4],
    pub relay: SimOutput,
}

impl SimTaps {
    /// Number of coils currently driven high
    pub fn energized_coils(&self) -> usize {
        self.motor.iter().filter(|coil| coil.is_set_high()).count()
    }

    /// Total phase activations across all coils
    pub fn motor_activations(&self) -> u64 {
        self.motor.iter().map(SimOutput::rising_edges).sum()
    }

    /// Relay is active low
    pub fn light_on(&self) -> bool {
        !self.relay.is_set_high()
    }
}

impl DoorPins<SimInput, SimOutput> {
    /// In-process pin set plus the handles to drive and observe it
    pub fn simulated() -> (Self, SimTaps) {
        let taps = SimTaps {
            outer_sensor: SimInput::new(),
            inner_sensor: SimInput::new(),
            motor: std::array::from_fn(|_| SimOutput::new()),
            // Relay line idles high (light off)
            relay: SimOutput::with_level(true),
        };
        let pins = Self {
            outer_sensor: taps.outer_sensor.clone(),
            inner_sensor: taps.inner_sensor.clone(),
            motor: taps.motor.clone(),
            relay: taps.relay.clone(),
        };
        (pins, taps)
    }
}
