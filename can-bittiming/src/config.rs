//! Bit-timing requests and controller constraint tables

pub use crate::core::BitTimingConstraints;
use fugit::HertzU32;

/// Sample point recommended by CAN in Automation, in tenths of a percent
pub const CIA_SAMPLE_POINT: u32 = 875;

/// Length of the synchronization segment, in time quanta
pub const SYNC_SEG_LEN: u32 = 1;

/// Highest bit rate that can be requested
pub const MAX_BIT_RATE: HertzU32 = HertzU32::MHz(8);

/// Largest bit rate deviation of an acceptable solution, in tenths of a
/// percent
pub const MAX_BIT_RATE_ERROR: u32 = 25;

/// Requested bus timing
///
/// Zero sample point and zero synchronization jump width are placeholders
/// for the defaults, [`CIA_SAMPLE_POINT`] and a jump width of 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTimingRequest {
    /// Bit rate of the bus
    ///
    /// Valid values are: 0 < bitrate <= [`MAX_BIT_RATE`]
    pub bitrate: HertzU32,
    /// Sample point, in tenths of a percent of the bit time
    ///
    /// Valid values are: 0 <= sample_point <= 1000
    pub sample_point: u32,
    /// Synchronization jump width, in time quanta
    ///
    /// 0 selects a jump width of 1, any other value the widest jump width the
    /// controller and the chosen phase segment 2 allow.
    pub sjw: u32,
}

impl BitTimingRequest {
    /// Create an instance
    ///
    /// Bit rate must be provided, sample point and synchronization jump width
    /// are left to their defaults.
    pub const fn new(bitrate: HertzU32) -> Self {
        Self {
            bitrate,
            sample_point: 0,
            sjw: 0,
        }
    }

    /// Request a specific sample point, in tenths of a percent
    pub const fn with_sample_point(self, sample_point: u32) -> Self {
        Self {
            sample_point,
            ..self
        }
    }

    /// Request a specific synchronization jump width, in time quanta
    pub const fn with_sjw(self, sjw: u32) -> Self {
        Self { sjw, ..self }
    }

    /// Sample point the solver aims for
    pub const fn effective_sample_point(&self) -> u32 {
        if self.sample_point == 0 {
            CIA_SAMPLE_POINT
        } else {
            self.sample_point
        }
    }
}

/// bxCAN (STM32 F0/F1/F2/F3/F4/F7/L4 classic CAN)
pub const BXCAN: BitTimingConstraints = BitTimingConstraints {
    tseg1_min: 1,
    tseg1_max: 16,
    tseg2_min: 1,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 1024,
    brp_inc: 1,
};

/// Bosch MCAN / STM32 FDCAN, nominal bit timing
pub const MCAN_NOMINAL: BitTimingConstraints = BitTimingConstraints {
    tseg1_min: 2,
    tseg1_max: 256,
    tseg2_min: 2,
    tseg2_max: 128,
    sjw_max: 128,
    brp_min: 1,
    brp_max: 512,
    brp_inc: 1,
};

/// Bosch MCAN / STM32 FDCAN, data phase bit timing
pub const MCAN_DATA: BitTimingConstraints = BitTimingConstraints {
    tseg1_min: 1,
    tseg1_max: 32,
    tseg2_min: 1,
    tseg2_max: 16,
    sjw_max: 16,
    brp_min: 1,
    brp_max: 32,
    brp_inc: 1,
};
