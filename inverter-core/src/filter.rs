//! Second-order low-pass filter
//!
//! The wind branch voltage comes off a rectifier, so its instantaneous
//! value ripples at the generator frequency. A persistent Butterworth
//! biquad stepped once per acquisition tick recovers the DC level.
//!
//! Coefficients are derived with the bilinear transform (pre-warped cutoff):
//!
//! ```text
//!   K    = tan(π·fc/fs)
//!   norm = 1 / (1 + K/Q + K²)
//!   b0 = K²·norm   b1 = 2·b0   b2 = b0
//!   a1 = 2(K² - 1)·norm         a2 = (1 - K/Q + K²)·norm
//!
//!   y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] - a1·y[n-1] - a2·y[n-2]
//! ```
//!
//! The state is created once at init and never reset.

use core::f32::consts::PI;

use crate::config::FilterSpec;

/// Direct form I biquad section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Butterworth-style low-pass for `design`
    pub fn lowpass(design: &FilterSpec) -> Self {
        let k = libm::tanf(PI * design.cutoff_hz / design.sample_rate_hz);
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / design.q + k2);
        let b0 = k2 * norm;

        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - k / design.q + k2) * norm,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Feed one sample, returning the filtered value
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Most recent output
    pub fn output(&self) -> f32 {
        self.y1
    }

    /// Gain at DC, 1.0 for a correctly designed low-pass
    pub fn dc_gain(&self) -> f32 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}
