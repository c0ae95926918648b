//! Multi-sample ADC acquisition
//!
//! Every analog channel is sampled N times with a short gap between samples
//! and reported as the arithmetic mean code. Battery channels use a large N
//! for stability; current and irradiance channels trade noise for latency.
//!
//! Sampling is cooperative: [`AnalogFrontEnd::poll`] takes at most one
//! sample per call and returns `WouldBlock` until the gap has passed, so a
//! 64-sample battery read never blocks the other tasks on a single core.
//!
//! ```text
//!  poll ─► gap elapsed? ─no──► WouldBlock
//!             │yes
//!             ▼
//!        adc.read(ch) ─► sum += code ─► N reached? ─► next channel ─► all done ─► Ok(RawFrame)
//! ```

use core::convert::Infallible;

use crate::config::{ChannelPlan, SamplingPlan};
use crate::time::TimeSource;

/// Number of analog channels
pub const CHANNEL_COUNT: usize = 7;

/// Analog inputs of the controller board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogChannel {
    /// Battery bank divider, first tap
    BatteryVoltage1,
    /// Battery bank divider, second tap
    BatteryVoltage2,
    /// Battery bank divider, third tap
    BatteryVoltage3,
    /// Solar branch shunt
    SolarCurrent,
    /// Wind branch shunt (rectified)
    WindCurrent,
    /// Load branch shunt
    LoadCurrent,
    /// Photoresistor
    Irradiance,
}

impl AnalogChannel {
    /// Channels in acquisition order
    pub const ALL: [AnalogChannel; CHANNEL_COUNT] = [
        AnalogChannel::BatteryVoltage1,
        AnalogChannel::BatteryVoltage2,
        AnalogChannel::BatteryVoltage3,
        AnalogChannel::SolarCurrent,
        AnalogChannel::WindCurrent,
        AnalogChannel::LoadCurrent,
        AnalogChannel::Irradiance,
    ];

    /// Position in [`Self::ALL`]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in logs and telemetry
    pub const fn name(self) -> &'static str {
        match self {
            AnalogChannel::BatteryVoltage1 => "bat1",
            AnalogChannel::BatteryVoltage2 => "bat2",
            AnalogChannel::BatteryVoltage3 => "bat3",
            AnalogChannel::SolarCurrent => "solar",
            AnalogChannel::WindCurrent => "eolica",
            AnalogChannel::LoadCurrent => "consumo",
            AnalogChannel::Irradiance => "ldr",
        }
    }

    /// Battery voltage taps
    pub const fn is_battery(self) -> bool {
        matches!(
            self,
            AnalogChannel::BatteryVoltage1
                | AnalogChannel::BatteryVoltage2
                | AnalogChannel::BatteryVoltage3
        )
    }
}

/// Non-blocking single-conversion ADC access
///
/// Implemented over the target HAL's one-shot ADC; `WouldBlock` means the
/// conversion is still running and the call should be repeated.
pub trait AdcReader {
    /// HAL error type
    type Error;

    /// Start or complete one conversion on `channel`
    fn read(&mut self, channel: AnalogChannel) -> nb::Result<u16, Self::Error>;
}

/// Mean raw code of every channel, all taken in the same acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame {
    codes: [u16; CHANNEL_COUNT],
    faulted: u8,
}

impl RawFrame {
    /// Frame from explicit codes, no faults
    pub const fn from_codes(codes: [u16; CHANNEL_COUNT]) -> Self {
        Self { codes, faulted: 0 }
    }

    /// Mean code of `channel` (0 when faulted)
    pub fn code(&self, channel: AnalogChannel) -> u16 {
        self.codes[channel.index()]
    }

    /// Whether the HAL failed on `channel` during this frame
    pub fn is_faulted(&self, channel: AnalogChannel) -> bool {
        self.faulted & (1 << channel.index()) != 0
    }

    /// All codes in acquisition order
    pub fn codes(&self) -> &[u16; CHANNEL_COUNT] {
        &self.codes
    }

    fn mark_faulted(&mut self, channel: AnalogChannel) {
        self.codes[channel.index()] = 0;
        self.faulted |= 1 << channel.index();
    }
}

/// Paced multi-sample reader over an [`AdcReader`]
#[derive(Debug, Clone)]
pub struct AnalogFrontEnd {
    plan: SamplingPlan,
    channel: usize,
    taken: u8,
    sum: u32,
    next_sample_us: Option<u64>,
    frame: RawFrame,
}

impl AnalogFrontEnd {
    /// Front end following `plan`
    pub fn new(plan: SamplingPlan) -> Self {
        Self {
            plan,
            channel: 0,
            taken: 0,
            sum: 0,
            next_sample_us: None,
            frame: RawFrame::default(),
        }
    }

    /// Sampling plan in use
    pub fn plan(&self) -> &SamplingPlan {
        &self.plan
    }

    fn channel_plan(&self, channel: AnalogChannel) -> ChannelPlan {
        match channel {
            AnalogChannel::BatteryVoltage1
            | AnalogChannel::BatteryVoltage2
            | AnalogChannel::BatteryVoltage3 => self.plan.battery,
            AnalogChannel::SolarCurrent
            | AnalogChannel::WindCurrent
            | AnalogChannel::LoadCurrent => self.plan.current,
            AnalogChannel::Irradiance => self.plan.irradiance,
        }
    }

    /// Take at most one sample at hardware time `now_us`
    ///
    /// Returns the completed frame once every channel has its N samples.
    /// A HAL error abandons the current channel for this frame and marks it
    /// faulted; acquisition continues with the next channel.
    pub fn poll<A: AdcReader>(
        &mut self,
        adc: &mut A,
        now_us: u64,
    ) -> nb::Result<RawFrame, Infallible> {
        if let Some(at) = self.next_sample_us {
            if now_us < at {
                return Err(nb::Error::WouldBlock);
            }
        }

        let channel = AnalogChannel::ALL[self.channel];
        let plan = self.channel_plan(channel);

        match adc.read(channel) {
            Ok(code) => {
                self.sum += code as u32;
                self.taken += 1;

                if self.taken >= plan.samples.max(1) {
                    self.frame.codes[channel.index()] = (self.sum / self.taken as u32) as u16;
                    self.finish_channel();
                } else {
                    self.next_sample_us = Some(now_us + plan.gap().ticks() as u64);
                }
            }
            Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(_)) => {
                log_warn!("ADC read failed on {}", channel.name());
                self.frame.mark_faulted(channel);
                self.finish_channel();
            }
        }

        if self.channel == CHANNEL_COUNT {
            let frame = self.frame;
            self.channel = 0;
            self.frame = RawFrame::default();
            return Ok(frame);
        }

        Err(nb::Error::WouldBlock)
    }

    fn finish_channel(&mut self) {
        self.channel += 1;
        self.taken = 0;
        self.sum = 0;
        self.next_sample_us = None;
    }

    /// Spin on [`Self::poll`] until a frame completes
    ///
    /// For single-task targets and host tools; the clock must advance while
    /// spinning.
    pub fn acquire_blocking<A: AdcReader, T: TimeSource>(
        &mut self,
        adc: &mut A,
        clock: &T,
    ) -> RawFrame {
        match nb::block!(self.poll(adc, clock.now_micros())) {
            Ok(frame) => frame,
            Err(never) => match never {},
        }
    }
}
