//! Task cadences, measurement windows and sampling plans

/// Acquisition tick (ms).
pub const ACQUISITION_PERIOD_MS: u32 = 100;

/// Protection evaluation period (ms).
pub const PROTECTION_PERIOD_MS: u32 = 500;

/// Anemometer measurement window (ms).
pub const WIND_WINDOW_MS: u32 = 1_000;

/// Generator frequency measurement window (ms).
pub const RPM_WINDOW_MS: u32 = 500;

/// Battery voltage samples per acquisition. Large for stability.
pub const BATTERY_SAMPLES: u8 = 64;

/// Gap between battery voltage samples (µs).
pub const BATTERY_SAMPLE_GAP_US: u32 = 50;

/// Current channel samples per acquisition.
pub const CURRENT_SAMPLES: u8 = 10;

/// Gap between current samples (µs).
pub const CURRENT_SAMPLE_GAP_US: u32 = 100;

/// Irradiance samples per acquisition.
pub const IRRADIANCE_SAMPLES: u8 = 10;

/// Gap between irradiance samples (µs).
pub const IRRADIANCE_SAMPLE_GAP_US: u32 = 100;
