//! Bit-timing solver
//!
//! The bit time of a CAN controller is split into time quanta `t_q`, each a
//! prescaler multiple of the controller clock:
//!
//! ```text
//! | sync | prop_seg + phase_seg1 (tseg1) | phase_seg2 (tseg2) |
//!                                        ^ sample point
//! ```
//!
//! [`solve`] searches all bit lengths the controller can represent, longest
//! first, picks the prescaler that gets closest to the requested bit rate and
//! then the segment split that gets closest to the requested sample point.
//! The arithmetic is integer-only.

use crate::config::{
    BitTimingConstraints, BitTimingRequest, MAX_BIT_RATE, MAX_BIT_RATE_ERROR, SYNC_SEG_LEN,
};
use crate::core::TimingSource;
use fugit::HertzU32;

/// Computed bit-timing parameters
///
/// Like the request, this struct holds *real* values. Register encodings
/// (often the value minus one) are up to the peripheral driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Achieved bit rate
    pub bitrate: HertzU32,
    /// Prescaler
    pub brp: u32,
    /// Propagation segment, in time quanta
    pub prop_seg: u32,
    /// Phase segment 1, in time quanta
    pub phase_seg1: u32,
    /// Phase segment 2, in time quanta
    pub phase_seg2: u32,
    /// Synchronization jump width, in time quanta
    pub sjw: u32,
    /// Achieved sample point, in tenths of a percent
    pub sample_point: u32,
}

impl BitTiming {
    /// Time before the sample point excluding the synchronization segment,
    /// `prop_seg + phase_seg1`
    pub fn tseg1(&self) -> u32 {
        self.prop_seg + self.phase_seg1
    }

    /// Returns the number of time quanta that make up one bit time, `t_bit /
    /// t_q`
    pub fn time_quanta_per_bit(&self) -> u32 {
        SYNC_SEG_LEN + self.tseg1() + self.phase_seg2
    }

    /// Frequency of the time quanta for a given controller clock
    pub fn time_quantum_clock(&self, base_freq: HertzU32) -> HertzU32 {
        HertzU32::from_raw(base_freq.to_Hz() / self.brp)
    }
}

/// Reasons why no usable [`BitTiming`] exists
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitTimingError {
    /// Requested bit rate is zero or above [`MAX_BIT_RATE`]
    InvalidBitRate,
    /// Requested sample point is above 1000 (100%)
    InvalidSamplePoint,
    /// Constraints are degenerate or admit no prescaler and segment split for
    /// the given clock
    NoConstraints,
    /// The closest bit rate deviates from the requested one by more than
    /// [`MAX_BIT_RATE_ERROR`]
    ToleranceExceeded {
        /// Closest bit rate found
        achieved: HertzU32,
        /// Deviation from the requested bit rate, in tenths of a percent
        error_per_mille: u32,
    },
}

/// Segment split for one bit length
#[derive(Copy, Clone)]
struct SamplePoint {
    tseg1: u32,
    tseg2: u32,
    sample_point: u32,
    error: u32,
}

/// Best solution found so far
#[derive(Copy, Clone)]
struct Candidate {
    bitrate: u64,
    brp: u64,
    bitrate_error: u64,
    spt: SamplePoint,
}

/// Splits a bit of `nbt_tq` time quanta so that the sample point gets as
/// close as possible to `desired`.
///
/// Two splits are tried, the ideal phase segment 2 truncated and one quantum
/// shorter, as the truncation may land on either side of the sample point.
/// On equal error the first one wins. Splits that cannot honour both segment
/// bounds are skipped; `None` if neither can.
fn update_sample_point(
    constraints: &BitTimingConstraints,
    desired: u32,
    nbt_tq: u64,
) -> Option<SamplePoint> {
    let nbt_tq = nbt_tq as i64;
    let sync = i64::from(SYNC_SEG_LEN);
    let desired = i64::from(desired);
    let tseg1_range = i64::from(constraints.tseg1_min)..=i64::from(constraints.tseg1_max);
    let tseg2_range = i64::from(constraints.tseg2_min)..=i64::from(constraints.tseg2_max);

    let mut best: Option<SamplePoint> = None;
    for i in 0..2 {
        let mut tseg2 = (nbt_tq - (desired * nbt_tq) / 1000 - i)
            .clamp(*tseg2_range.start(), *tseg2_range.end());

        // tseg1 bounds take priority over tseg2 bounds
        let mut tseg1 = nbt_tq - sync - tseg2;
        if tseg1 > *tseg1_range.end() {
            tseg1 = *tseg1_range.end();
            tseg2 = nbt_tq - sync - tseg1;
        } else if tseg1 < *tseg1_range.start() {
            tseg1 = *tseg1_range.start();
            tseg2 = nbt_tq - sync - tseg1;
        }
        if !tseg2_range.contains(&tseg2) {
            continue;
        }

        let sample_point = (1000 * (nbt_tq - tseg2)) / nbt_tq;
        let error = (desired - sample_point).unsigned_abs() as u32;
        if best.map_or(true, |best| error < best.error) {
            // Both segments are within their `u32` bounds and 0 <= sample_point <= 1000
            best = Some(SamplePoint {
                tseg1: tseg1 as u32,
                tseg2: tseg2 as u32,
                sample_point: sample_point as u32,
                error,
            });
        }
    }
    best
}

/// Compute the bit timing for a controller clocked at `base_freq`
///
/// A zero sample point in the request selects [`CIA_SAMPLE_POINT`]. A zero
/// jump width selects a jump width of 1; any other value selects the widest
/// jump width `constraints` and the chosen phase segment 2 allow.
///
/// Among solutions with the same bit rate error the one with the smaller
/// sample point error wins, and among those the longest bit time.
///
/// # Example
/// ```
/// use can_bittiming::bittiming::solve;
/// use can_bittiming::config::{BitTimingRequest, BXCAN};
/// use fugit::RateExtU32;
///
/// let timing = solve(&BitTimingRequest::new(1.MHz()), 32.MHz(), &BXCAN).unwrap();
/// assert_eq!(timing.brp, 2);
/// assert_eq!(timing.time_quanta_per_bit(), 16);
/// assert_eq!(timing.sample_point, 875);
/// ```
///
/// [`CIA_SAMPLE_POINT`]: crate::config::CIA_SAMPLE_POINT
pub fn solve(
    request: &BitTimingRequest,
    base_freq: HertzU32,
    constraints: &BitTimingConstraints,
) -> Result<BitTiming, BitTimingError> {
    let desired_bitrate = u64::from(request.bitrate.to_Hz());
    if desired_bitrate == 0 || request.bitrate > MAX_BIT_RATE {
        return Err(BitTimingError::InvalidBitRate);
    }
    if request.sample_point > 1000 {
        return Err(BitTimingError::InvalidSamplePoint);
    }
    if !constraints.is_valid() {
        return Err(BitTimingError::NoConstraints);
    }

    let desired_spt = request.effective_sample_point();
    let base = u64::from(base_freq.to_Hz());
    let sync = u64::from(SYNC_SEG_LEN);
    let brp_inc = u64::from(constraints.brp_inc);
    let brp_range = u64::from(constraints.brp_min)..=u64::from(constraints.brp_max);

    // Bit lengths are walked doubled: an even `nbt_tq_x2` rounds the
    // prescaler down, an odd one rounds it up.
    let longest =
        (u64::from(constraints.tseg1_max) + u64::from(constraints.tseg2_max)) * 2 + sync + 1;
    let shortest =
        (u64::from(constraints.tseg1_min) + u64::from(constraints.tseg2_min)) * 2 + sync;

    let mut best: Option<Candidate> = None;
    for nbt_tq_x2 in (shortest..=longest).rev() {
        let nbt_tq = nbt_tq_x2 / 2;
        let brp = base / (nbt_tq * desired_bitrate) + nbt_tq_x2 % 2;

        // Round, then truncate to the prescaler step
        let brp = (brp / brp_inc) * brp_inc;
        if !brp_range.contains(&brp) {
            continue;
        }

        let bitrate = base / (brp * nbt_tq);
        let bitrate_error = desired_bitrate.abs_diff(bitrate);

        // A strictly better bit rate resets the sample point error to beat
        let spt_to_beat = match best {
            Some(best) if bitrate_error > best.bitrate_error => continue,
            Some(best) if bitrate_error == best.bitrate_error => best.spt.error,
            _ => u32::MAX,
        };
        let spt = match update_sample_point(constraints, desired_spt, nbt_tq) {
            Some(spt) if spt.error < spt_to_beat => spt,
            _ => continue,
        };

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "bit timing candidate: brp={} tq={} bitrate={} spt={}",
            brp,
            nbt_tq,
            bitrate,
            spt.sample_point
        );

        best = Some(Candidate {
            bitrate,
            brp,
            bitrate_error,
            spt,
        });

        if bitrate_error == 0 && spt.error == 0 {
            break;
        }
    }

    let best = match best {
        Some(best) => best,
        None => {
            #[cfg(feature = "defmt")]
            defmt::debug!("no bit timing candidate for {} Hz", desired_bitrate);
            return Err(BitTimingError::NoConstraints);
        }
    };

    let prop_seg = best.spt.tseg1 / 2;
    let phase_seg2 = best.spt.tseg2;
    let sjw = if request.sjw == 0 || constraints.sjw_max == 0 {
        1
    } else {
        // SJW may not exceed phase segment 2
        constraints.sjw_max.min(phase_seg2)
    };

    // The candidate's bit rate is at most `base_freq` and its prescaler at
    // most `brp_max`, both fit in `u32`.
    let achieved = HertzU32::from_raw(best.bitrate as u32);
    let error_per_mille =
        u32::try_from(best.bitrate_error * 1000 / desired_bitrate).unwrap_or(u32::MAX);

    #[cfg(feature = "defmt")]
    defmt::debug!(
        "bit timing: brp={} tseg1={} tseg2={} sjw={} bitrate={} spt={} err={}",
        best.brp,
        best.spt.tseg1,
        phase_seg2,
        sjw,
        best.bitrate,
        best.spt.sample_point,
        error_per_mille
    );

    if error_per_mille > MAX_BIT_RATE_ERROR {
        return Err(BitTimingError::ToleranceExceeded {
            achieved,
            error_per_mille,
        });
    }

    Ok(BitTiming {
        bitrate: achieved,
        brp: best.brp as u32,
        prop_seg,
        phase_seg1: best.spt.tseg1 - prop_seg,
        phase_seg2,
        sjw,
        sample_point: best.spt.sample_point,
    })
}

/// Compute the nominal bit timing of a peripheral described by a
/// [`TimingSource`]
pub fn solve_for<T: TimingSource>(
    source: &T,
    request: &BitTimingRequest,
) -> Result<BitTiming, BitTimingError> {
    solve(request, source.can_clock(), &source.nominal_constraints())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{BXCAN, MCAN_DATA, MCAN_NOMINAL};
    use fugit::RateExtU32;

    fn request(bitrate: HertzU32, sample_point: u32, sjw: u32) -> BitTimingRequest {
        BitTimingRequest::new(bitrate)
            .with_sample_point(sample_point)
            .with_sjw(sjw)
    }

    #[test]
    fn one_megabit_from_32_mhz() {
        let timing = solve(&BitTimingRequest::new(1.MHz()), 32.MHz(), &BXCAN).unwrap();
        assert_eq!(
            timing,
            BitTiming {
                bitrate: 1.MHz(),
                brp: 2,
                prop_seg: 6,
                phase_seg1: 7,
                phase_seg2: 2,
                sjw: 1,
                sample_point: 875,
            }
        );
        assert_eq!(timing.tseg1(), 13);
        assert_eq!(timing.time_quanta_per_bit(), 16);
        assert_eq!(timing.time_quantum_clock(32.MHz()), HertzU32::MHz(16));
    }

    #[test]
    fn slow_bus_from_8_mhz() {
        let timing = solve(&request(125.kHz(), 875, 0), 8.MHz(), &BXCAN).unwrap();
        assert_eq!(timing.bitrate, HertzU32::kHz(125));
        assert_eq!(timing.brp, 4);
        assert_eq!(timing.time_quanta_per_bit(), 16);
        assert_eq!(timing.sample_point, 875);
    }

    #[test]
    fn bit_rate_out_of_range() {
        assert_eq!(
            solve(&BitTimingRequest::new(HertzU32::from_raw(8_000_001)), 80.MHz(), &BXCAN),
            Err(BitTimingError::InvalidBitRate)
        );
        assert_eq!(
            solve(&BitTimingRequest::new(0.Hz()), 80.MHz(), &BXCAN),
            Err(BitTimingError::InvalidBitRate)
        );
    }

    #[test]
    fn highest_bit_rate_is_accepted() {
        let timing = solve(&BitTimingRequest::new(MAX_BIT_RATE), 80.MHz(), &MCAN_DATA).unwrap();
        assert_eq!(timing.bitrate, MAX_BIT_RATE);
    }

    #[test]
    fn sample_point_out_of_range() {
        assert_eq!(
            solve(&request(500.kHz(), 1001, 0), 32.MHz(), &BXCAN),
            Err(BitTimingError::InvalidSamplePoint)
        );
    }

    #[test]
    fn low_clock_exceeds_tolerance() {
        let constraints = BitTimingConstraints {
            tseg1_min: 1,
            tseg1_max: 2,
            tseg2_min: 1,
            tseg2_max: 2,
            sjw_max: 1,
            brp_min: 1,
            brp_max: 1024,
            brp_inc: 1,
        };
        assert_eq!(
            solve(&BitTimingRequest::new(1.MHz()), 1.MHz(), &constraints),
            Err(BitTimingError::ToleranceExceeded {
                achieved: HertzU32::from_raw(333_333),
                error_per_mille: 666,
            })
        );
    }

    #[test]
    fn sjw_is_clamped_to_phase_seg2() {
        let timing = solve(&request(1.MHz(), 0, 4), 32.MHz(), &BXCAN).unwrap();
        assert_eq!(timing.phase_seg2, 2);
        assert_eq!(timing.sjw, 2);
    }

    #[test]
    fn sjw_defaults_to_one() {
        let timing = solve(&request(500.kHz(), 800, 0), 40.MHz(), &MCAN_NOMINAL).unwrap();
        assert_eq!(timing.sjw, 1);

        let fixed_sjw = BitTimingConstraints {
            sjw_max: 0,
            ..BXCAN
        };
        let timing = solve(&request(500.kHz(), 800, 4), 40.MHz(), &fixed_sjw).unwrap();
        assert_eq!(timing.sjw, 1);
    }

    #[test]
    fn sjw_is_limited_by_constraints() {
        let timing = solve(&request(500.kHz(), 800, 100), 40.MHz(), &BXCAN).unwrap();
        assert!(timing.phase_seg2 >= 4);
        assert_eq!(timing.sjw, 4);
    }

    #[test]
    fn degenerate_constraints() {
        let no_step = BitTimingConstraints { brp_inc: 0, ..BXCAN };
        assert_eq!(
            solve(&BitTimingRequest::new(500.kHz()), 32.MHz(), &no_step),
            Err(BitTimingError::NoConstraints)
        );

        let inverted = BitTimingConstraints {
            tseg1_min: 20,
            ..BXCAN
        };
        assert_eq!(
            solve(&BitTimingRequest::new(500.kHz()), 32.MHz(), &inverted),
            Err(BitTimingError::NoConstraints)
        );
    }

    #[test]
    fn no_prescaler_fits() {
        let constraints = BitTimingConstraints {
            brp_min: 1000,
            brp_max: 1000,
            ..BXCAN
        };
        assert_eq!(
            solve(&BitTimingRequest::new(1.MHz()), 8.MHz(), &constraints),
            Err(BitTimingError::NoConstraints)
        );
    }

    #[test]
    fn prescaler_step_is_honoured() {
        let constraints = BitTimingConstraints { brp_inc: 4, ..BXCAN };
        let timing = solve(&BitTimingRequest::new(1.MHz()), 32.MHz(), &constraints).unwrap();
        assert_eq!(timing.brp, 4);
        assert_eq!(timing.time_quanta_per_bit(), 8);
        assert_eq!(timing.bitrate, HertzU32::MHz(1));
        assert_eq!(timing.sample_point, 875);
    }

    #[test]
    fn better_sample_point_wins_on_equal_bit_rate() {
        // 24 and 12 quanta per bit are exact too, but their sample points
        // are further off than the one of 8 quanta.
        let timing = solve(&BitTimingRequest::new(1.MHz()), 24.MHz(), &BXCAN).unwrap();
        assert_eq!(timing.brp, 3);
        assert_eq!(timing.tseg1(), 6);
        assert_eq!(timing.phase_seg2, 1);
        assert_eq!(timing.sample_point, 875);
    }

    #[test]
    fn longer_bit_wins_on_equal_errors() {
        // 16 and 8 quanta per bit both reach 87.5% for a requested 90%
        let timing = solve(&request(500.kHz(), 900, 0), 16.MHz(), &BXCAN).unwrap();
        assert_eq!(timing.brp, 2);
        assert_eq!(timing.time_quanta_per_bit(), 16);
        assert_eq!(timing.phase_seg2, 2);
        assert_eq!(timing.sample_point, 875);
    }

    #[test]
    fn extreme_sample_points() {
        for sample_point in [1, 1000] {
            let timing = solve(&request(500.kHz(), sample_point, 0), 16.MHz(), &BXCAN).unwrap();
            assert!(BXCAN.tseg1_range().contains(&timing.tseg1()));
            assert!(BXCAN.tseg2_range().contains(&timing.phase_seg2));
        }
    }

    #[test]
    fn solving_is_repeatable() {
        let request = request(250.kHz(), 800, 3);
        let first = solve(&request, 36.MHz(), &MCAN_NOMINAL);
        let second = solve(&request, 36.MHz(), &MCAN_NOMINAL);
        assert_eq!(first, second);
    }

    struct Bxcan;

    impl TimingSource for Bxcan {
        fn can_clock(&self) -> HertzU32 {
            42.MHz()
        }

        fn nominal_constraints(&self) -> BitTimingConstraints {
            BXCAN
        }
    }

    #[test]
    fn timing_source_matches_plain_solve() {
        let request = BitTimingRequest::new(500.kHz());
        assert_eq!(
            solve_for(&Bxcan, &request),
            solve(&request, 42.MHz(), &BXCAN)
        );
    }

    #[test]
    fn results_respect_constraints() {
        let clocks: [u32; 10] = [
            8_000_000,
            16_000_000,
            24_000_000,
            32_000_000,
            36_000_000,
            40_000_000,
            42_000_000,
            48_000_000,
            80_000_000,
            170_000_000,
        ];
        let bitrates: [u32; 9] = [
            10_000, 20_000, 50_000, 100_000, 125_000, 250_000, 500_000, 800_000, 1_000_000,
        ];
        let stepped = BitTimingConstraints { brp_inc: 2, ..BXCAN };
        let tables = [BXCAN, MCAN_NOMINAL, MCAN_DATA, stepped];

        for clock in clocks {
            for bitrate in bitrates {
                for constraints in &tables {
                    for sample_point in [0, 500, 750, 875, 900, 1000] {
                        for sjw in [0, 1, 3, 200] {
                            let request = BitTimingRequest {
                                bitrate: HertzU32::from_raw(bitrate),
                                sample_point,
                                sjw,
                            };
                            let clock = HertzU32::from_raw(clock);
                            match solve(&request, clock, constraints) {
                                Ok(timing) => check(&timing, &request, clock, constraints),
                                Err(BitTimingError::ToleranceExceeded {
                                    error_per_mille, ..
                                }) => assert!(error_per_mille > MAX_BIT_RATE_ERROR),
                                Err(BitTimingError::NoConstraints) => {}
                                Err(e) => panic!("unexpected {:?}", e),
                            }
                        }
                    }
                }
            }
        }
    }

    fn check(
        timing: &BitTiming,
        request: &BitTimingRequest,
        clock: HertzU32,
        constraints: &BitTimingConstraints,
    ) {
        assert_eq!(timing.brp % constraints.brp_inc, 0);
        assert!(constraints.prescaler_range().contains(&timing.brp));
        assert!(constraints.tseg1_range().contains(&timing.tseg1()));
        assert!(constraints.tseg2_range().contains(&timing.phase_seg2));
        assert!(timing.sjw >= 1);
        assert!(timing.sjw <= timing.phase_seg2);
        if constraints.sjw_max > 0 {
            assert!(timing.sjw <= constraints.sjw_max);
        }

        let tq = timing.time_quanta_per_bit();
        assert_eq!(timing.bitrate.to_Hz(), clock.to_Hz() / (timing.brp * tq));
        assert_eq!(timing.sample_point, 1000 * (1 + timing.tseg1()) / tq);

        let desired = request.bitrate.to_Hz();
        let error = u64::from(desired.abs_diff(timing.bitrate.to_Hz()));
        assert!(error * 1000 / u64::from(desired) <= u64::from(MAX_BIT_RATE_ERROR));
    }
}
