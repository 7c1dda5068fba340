#![no_std]
#![warn(missing_docs)]

//! `can-bittiming-core` provides a set of essential abstractions that serve as
//! a thin integration layer between the platform independent
//! [`can-bittiming`] solver and platform specific HAL crates (in documentation
//! also referred to as _target HALs_).
//!
//! A target HAL describes each of its CAN peripherals by implementing
//! [`TimingSource`]: the frequency of the clock feeding the bit-timing
//! prescaler and the [`BitTimingConstraints`] of the controller. The solver
//! never touches the hardware; programming the computed values into the
//! peripheral registers stays the job of the target HAL.
//!
//! [`can-bittiming`]: <https://docs.rs/crate/can-bittiming/>

use core::ops::RangeInclusive;

pub use fugit;

/// Hardware limits of a CAN controller's bit-timing logic
///
/// All values are *real* values, not register encodings: a controller that
/// stores the prescaler minus one in a 10 bit field has `brp_min = 1` and
/// `brp_max = 1024`.
///
/// `tseg1` is the propagation segment and phase segment 1 combined, `tseg2`
/// is phase segment 2. Segment lengths are in time quanta.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTimingConstraints {
    /// Shortest time segment 1
    pub tseg1_min: u32,
    /// Longest time segment 1
    pub tseg1_max: u32,
    /// Shortest time segment 2
    pub tseg2_min: u32,
    /// Longest time segment 2
    pub tseg2_max: u32,
    /// Largest synchronization jump width
    ///
    /// 0 means that the controller does not allow to configure it and the
    /// jump width is fixed at 1.
    pub sjw_max: u32,
    /// Smallest prescaler
    pub brp_min: u32,
    /// Largest prescaler
    pub brp_max: u32,
    /// Prescaler step; only multiples of it can be programmed
    pub brp_inc: u32,
}

impl BitTimingConstraints {
    /// Returns `true` if the constraints describe a non-empty search space
    ///
    /// All bounds apart from `sjw_max` have to be positive and every range
    /// has to be ordered.
    pub const fn is_valid(&self) -> bool {
        self.tseg1_min > 0
            && self.tseg2_min > 0
            && self.brp_min > 0
            && self.brp_inc > 0
            && self.tseg1_min <= self.tseg1_max
            && self.tseg2_min <= self.tseg2_max
            && self.brp_min <= self.brp_max
    }

    /// Valid lengths of time segment 1
    pub fn tseg1_range(&self) -> RangeInclusive<u32> {
        self.tseg1_min..=self.tseg1_max
    }

    /// Valid lengths of time segment 2
    pub fn tseg2_range(&self) -> RangeInclusive<u32> {
        self.tseg2_min..=self.tseg2_max
    }

    /// Valid prescaler values, before taking `brp_inc` into account
    pub fn prescaler_range(&self) -> RangeInclusive<u32> {
        self.brp_min..=self.brp_max
    }

    /// Bit times, in time quanta, that a solver explores for these
    /// constraints
    ///
    /// The upper end includes the synchronization segment; the lower end is
    /// the sum of the shortest segments.
    pub fn time_quanta_per_bit_range(&self) -> RangeInclusive<u32> {
        self.tseg1_min.saturating_add(self.tseg2_min)
            ..=self.tseg1_max.saturating_add(self.tseg2_max).saturating_add(1)
    }
}

/// Trait describing the bit-timing capabilities of a CAN peripheral
///
/// Implemented by target HALs, usually on the same type that owns the clock
/// and the peripheral instance. It only conveys *what* the peripheral can do;
/// it gives no access to the peripheral.
///
/// # Example
/// ```
/// use can_bittiming_core::fugit::HertzU32;
/// use can_bittiming_core::{BitTimingConstraints, TimingSource};
///
/// struct Can1 {
///     apb1: HertzU32,
/// }
///
/// impl TimingSource for Can1 {
///     fn can_clock(&self) -> HertzU32 {
///         self.apb1
///     }
///
///     fn nominal_constraints(&self) -> BitTimingConstraints {
///         BitTimingConstraints {
///             tseg1_min: 1,
///             tseg1_max: 16,
///             tseg2_min: 1,
///             tseg2_max: 8,
///             sjw_max: 4,
///             brp_min: 1,
///             brp_max: 1024,
///             brp_inc: 1,
///         }
///     }
/// }
///
/// let can = Can1 { apb1: HertzU32::MHz(36) };
/// assert!(can.nominal_constraints().is_valid());
/// assert!(can.data_constraints().is_none());
/// ```
pub trait TimingSource {
    /// Frequency of the clock feeding the bit-timing prescaler.
    ///
    /// It must not change while a bit timing computed from it is in use.
    fn can_clock(&self) -> fugit::HertzU32;

    /// Constraints of the nominal (arbitration phase) bit timing.
    fn nominal_constraints(&self) -> BitTimingConstraints;

    /// Constraints of the data phase bit timing of bit rate switched CAN FD
    /// frames.
    ///
    /// `None` for controllers that only support classic CAN.
    fn data_constraints(&self) -> Option<BitTimingConstraints> {
        None
    }
}
