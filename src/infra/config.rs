//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// Linux sysfs GPIO (Raspberry Pi)
    Sysfs,
    /// In-process pins, sensors pulsed from stdin
    Simulated,
}

impl GpioBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpioBackend::Sysfs => "sysfs",
            GpioBackend::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "door".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinsConfig {
    pub outer_sensor: u32,
    pub inner_sensor: u32,
    /// Motor phase lines A, B, C, D
    pub motor: [u32; 4],
    pub relay: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpioConfig {
    pub backend: GpioBackend,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
}

fn default_sysfs_root() -> String {
    "/sys/class/gpio".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    pub ramp_steps: u32,
    pub rotation_speed: f64,
    #[serde(default = "default_release_after_move")]
    pub release_after_move: bool,
}

fn default_release_after_move() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    pub poll_interval_ms: u64,
    pub confirmation_window_ms: u64,
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
    pub collector_url: String,
    #[serde(default = "default_telemetry_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_telemetry_queue_size")]
    pub queue_size: usize,
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_timeout_ms() -> u64 {
    2000
}

fn default_telemetry_queue_size() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), retry_delay_ms: default_retry_delay_ms() }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub pins: PinsConfig,
    pub gpio: GpioConfig,
    pub motor: MotorConfig,
    pub detection: DetectionConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    outer_sensor_pin: u32,
    inner_sensor_pin: u32,
    motor_pins: [u32; 4],
    relay_pin: u32,
    gpio_backend: GpioBackend,
    sysfs_root: String,
    ramp_steps: u32,
    rotation_speed: f64,
    release_after_move: bool,
    poll_interval_ms: u64,
    confirmation_window_ms: u64,
    cooldown_ms: u64,
    telemetry_enabled: bool,
    collector_url: String,
    telemetry_timeout_ms: u64,
    telemetry_queue_size: usize,
    hardware_max_attempts: u32,
    hardware_retry_delay_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "door".to_string(),
            outer_sensor_pin: 24,
            inner_sensor_pin: 23,
            motor_pins: [5, 6, 13, 19],
            relay_pin: 17,
            gpio_backend: GpioBackend::Sysfs,
            sysfs_root: "/sys/class/gpio".to_string(),
            ramp_steps: 500,
            rotation_speed: 3.0,
            release_after_move: true,
            poll_interval_ms: 100,
            confirmation_window_ms: 5000,
            cooldown_ms: 5000,
            telemetry_enabled: true,
            collector_url: "http://192.168.137.19:5000".to_string(),
            telemetry_timeout_ms: 2000,
            telemetry_queue_size: 16,
            hardware_max_attempts: 3,
            hardware_retry_delay_ms: 10,
            metrics_interval_secs: 60,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Config file path from the environment, or the default
    pub fn resolve_config_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self {
            site_id: toml_config.site.id,
            outer_sensor_pin: toml_config.pins.outer_sensor,
            inner_sensor_pin: toml_config.pins.inner_sensor,
            motor_pins: toml_config.pins.motor,
            relay_pin: toml_config.pins.relay,
            gpio_backend: toml_config.gpio.backend,
            sysfs_root: toml_config.gpio.sysfs_root,
            ramp_steps: toml_config.motor.ramp_steps,
            rotation_speed: toml_config.motor.rotation_speed,
            release_after_move: toml_config.motor.release_after_move,
            poll_interval_ms: toml_config.detection.poll_interval_ms,
            confirmation_window_ms: toml_config.detection.confirmation_window_ms,
            cooldown_ms: toml_config.detection.cooldown_ms,
            telemetry_enabled: toml_config.telemetry.enabled,
            collector_url: toml_config.telemetry.collector_url,
            telemetry_timeout_ms: toml_config.telemetry.timeout_ms,
            telemetry_queue_size: toml_config.telemetry.queue_size,
            hardware_max_attempts: toml_config.hardware.max_attempts,
            hardware_retry_delay_ms: toml_config.hardware.retry_delay_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ramp_steps == 0 {
            bail!("motor.ramp_steps must be at least 1");
        }
        if !(self.rotation_speed.is_finite() && self.rotation_speed > 0.0) {
            bail!("motor.rotation_speed must be positive, got {}", self.rotation_speed);
        }
        let Ok(step_interval) = Duration::try_from_secs_f64(1.0 / (50.0 * self.rotation_speed))
        else {
            bail!("motor.rotation_speed {} gives an unusable step interval", self.rotation_speed);
        };
        if step_interval.checked_mul(self.ramp_steps).is_none() {
            bail!(
                "motor.ramp_steps {} at rotation_speed {} overflows the travel time",
                self.ramp_steps,
                self.rotation_speed
            );
        }
        if self.poll_interval_ms == 0 {
            bail!("detection.poll_interval_ms must be positive");
        }
        if self.hardware_max_attempts == 0 {
            bail!("hardware.max_attempts must be at least 1");
        }
        if self.telemetry_queue_size == 0 {
            bail!("telemetry.queue_size must be at least 1");
        }

        let mut motor = self.motor_pins;
        motor.sort_unstable();
        if motor.windows(2).any(|w| w[0] == w[1]) {
            bail!("pins.motor must name 4 distinct lines, got {:?}", self.motor_pins);
        }
        for input in [self.outer_sensor_pin, self.inner_sensor_pin] {
            if self.motor_pins.contains(&input) || self.relay_pin == input {
                bail!("pin {} is configured as both sensor and output", input);
            }
        }
        if self.outer_sensor_pin == self.inner_sensor_pin {
            bail!("outer and inner sensors share pin {}", self.outer_sensor_pin);
        }
        if self.motor_pins.contains(&self.relay_pin) {
            bail!("relay pin {} is also a motor pin", self.relay_pin);
        }
        Ok(())
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Delay between motor steps: 1 / (50 * rotation_speed) seconds
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / (50.0 * self.rotation_speed))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn outer_sensor_pin(&self) -> u32 {
        self.outer_sensor_pin
    }

    pub fn inner_sensor_pin(&self) -> u32 {
        self.inner_sensor_pin
    }

    pub fn motor_pins(&self) -> [u32; 4] {
        self.motor_pins
    }

    pub fn relay_pin(&self) -> u32 {
        self.relay_pin
    }

    pub fn gpio_backend(&self) -> GpioBackend {
        self.gpio_backend
    }

    pub fn sysfs_root(&self) -> &str {
        &self.sysfs_root
    }

    pub fn ramp_steps(&self) -> u32 {
        self.ramp_steps
    }

    pub fn rotation_speed(&self) -> f64 {
        self.rotation_speed
    }

    pub fn release_after_move(&self) -> bool {
        self.release_after_move
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn confirmation_window_ms(&self) -> u64 {
        self.confirmation_window_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    pub fn collector_url(&self) -> &str {
        &self.collector_url
    }

    pub fn telemetry_timeout_ms(&self) -> u64 {
        self.telemetry_timeout_ms
    }

    pub fn telemetry_queue_size(&self) -> usize {
        self.telemetry_queue_size
    }

    pub fn hardware_max_attempts(&self) -> u32 {
        self.hardware_max_attempts
    }

    pub fn hardware_retry_delay_ms(&self) -> u64 {
        self.hardware_retry_delay_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to switch the GPIO backend (used by tools and tests)
    pub fn with_gpio_backend(mut self, backend: GpioBackend) -> Self {
        self.gpio_backend = backend;
        self
    }

    /// Builder method to override the collector URL
    pub fn with_collector_url(mut self, url: &str) -> Self {
        self.collector_url = url.to_string();
        self
    }

    /// Builder method to override detection timing
    pub fn with_detection_timing(mut self, poll_ms: u64, window_ms: u64, cooldown_ms: u64) -> Self {
        self.poll_interval_ms = poll_ms;
        self.confirmation_window_ms = window_ms;
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// Builder method to override the motor ramp
    pub fn with_motor(mut self, ramp_steps: u32, rotation_speed: f64) -> Self {
        self.ramp_steps = ramp_steps;
        self.rotation_speed = rotation_speed;
        self
    }

    /// Builder method to override the hardware retry policy
    pub fn with_hardware_retries(mut self, max_attempts: u32, retry_delay_ms: u64) -> Self {
        self.hardware_max_attempts = max_attempts;
        self.hardware_retry_delay_ms = retry_delay_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.outer_sensor_pin(), 24);
        assert_eq!(config.inner_sensor_pin(), 23);
        assert_eq!(config.motor_pins(), [5, 6, 13, 19]);
        assert_eq!(config.relay_pin(), 17);
        assert_eq!(config.ramp_steps(), 500);
        assert_eq!(config.confirmation_window_ms(), 5000);
        assert_eq!(config.cooldown_ms(), 5000);
        assert_eq!(config.poll_interval_ms(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_interval_from_rotation_speed() {
        let config = Config::default();
        // 1 / (50 * 3) s
        assert_eq!(config.step_interval().as_micros(), 6666);

        let fast = Config::default().with_motor(500, 10.0);
        assert_eq!(fast.step_interval().as_micros(), 2000);
    }

    #[test]
    fn test_validate_rejects_zero_ramp() {
        let config = Config::default().with_motor(0, 3.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_speed() {
        assert!(Config::default().with_motor(500, 0.0).validate().is_err());
        assert!(Config::default().with_motor(500, -1.0).validate().is_err());
        assert!(Config::default().with_motor(500, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_speed() {
        // Positive and finite, but 1 / (50 * speed) is not a Duration
        let config = Config::default().with_motor(500, 1e-300);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("step interval"));
    }

    #[test]
    fn test_validate_rejects_travel_time_overflow() {
        // ~2e11 s per step fits a Duration, times u32::MAX steps does not
        let config = Config::default().with_motor(u32::MAX, 1e-13);
        assert!(config.validate().is_err());

        let slow = Config::default().with_motor(500, 0.001);
        assert!(slow.validate().is_ok());
        assert_eq!(slow.step_interval().as_secs(), 20);
    }

    #[test]
    fn test_validate_rejects_pin_overlap() {
        let mut config = Config::default();
        config.relay_pin = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motor_pins = [5, 5, 13, 19];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.inner_sensor_pin = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.outer_sensor_pin = 17;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_config_path_default() {
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(), "config/dev.toml");
        }
    }
}
