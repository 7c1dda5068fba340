//! CAN FD timing
//!
//! Bit rate switched CAN FD frames use two bit timings from the same clock:
//! the nominal one for arbitration and a faster one for the data phase.

use crate::bittiming::{solve, BitTiming, BitTimingError};
use crate::config::{BitTimingConstraints, BitTimingRequest};
use crate::core::TimingSource;
use fugit::HertzU32;

/// Nominal and data phase bit timing of a CAN FD controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FdBitTiming {
    /// Arbitration phase
    pub nominal: BitTiming,
    /// Data phase of bit rate switched frames
    pub data: BitTiming,
}

/// Errors that may occur when computing a CAN FD timing
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FdBitTimingError {
    /// Problems with the nominal bit timing
    Nominal(BitTimingError),
    /// Problems with the data phase bit timing
    Data(BitTimingError),
    /// Peripheral has no data phase timing
    DataPhaseUnsupported,
}

/// Compute nominal and data phase timing for a controller clocked at
/// `base_freq`
///
/// A data bit rate below the nominal one is rejected as
/// [`BitTimingError::InvalidBitRate`] of the data phase.
pub fn solve_fd(
    nominal: &BitTimingRequest,
    data: &BitTimingRequest,
    base_freq: HertzU32,
    nominal_constraints: &BitTimingConstraints,
    data_constraints: &BitTimingConstraints,
) -> Result<FdBitTiming, FdBitTimingError> {
    let nominal_timing =
        solve(nominal, base_freq, nominal_constraints).map_err(FdBitTimingError::Nominal)?;
    if data.bitrate < nominal.bitrate {
        return Err(FdBitTimingError::Data(BitTimingError::InvalidBitRate));
    }
    let data_timing = solve(data, base_freq, data_constraints).map_err(FdBitTimingError::Data)?;
    Ok(FdBitTiming {
        nominal: nominal_timing,
        data: data_timing,
    })
}

/// Compute nominal and data phase timing of a peripheral described by a
/// [`TimingSource`]
pub fn solve_fd_for<T: TimingSource>(
    source: &T,
    nominal: &BitTimingRequest,
    data: &BitTimingRequest,
) -> Result<FdBitTiming, FdBitTimingError> {
    let data_constraints = source
        .data_constraints()
        .ok_or(FdBitTimingError::DataPhaseUnsupported)?;
    solve_fd(
        nominal,
        data,
        source.can_clock(),
        &source.nominal_constraints(),
        &data_constraints,
    )
}
