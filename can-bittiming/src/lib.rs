#![no_std]
#![warn(missing_docs)]
//! # CAN bit timing
//!
//! ## Overview
//! This crate computes CAN controller bit timings: given a clock, a requested
//! bit rate and sample point, and the limits of the controller, it finds the
//! prescaler and segment lengths that reproduce the request best.
//!
//! It provides the following features:
//!
//! - integer-only search, usable on targets without an FPU
//! - explicit failure when the closest bit rate is more than 2.5% off, instead
//!   of a silently wrong bus speed
//! - nominal and data phase timing for CAN FD controllers
//! - constraint tables for common controllers in [`config`]
//!
//! The solver is a pure function. It never touches the hardware; the target
//! HAL programs the computed values into the peripheral, usually as the value
//! minus one. Target HALs may describe their peripherals through the
//! [`TimingSource`] trait from [`can_bittiming_core`].
//!
//! ## Usage
//!
//! ```
//! use can_bittiming::bittiming::{solve, BitTimingError};
//! use can_bittiming::config::{BitTimingRequest, BXCAN};
//! use fugit::RateExtU32 as _;
//!
//! // 500 kbit/s at 80% sample point from a 40 MHz clock
//! let request = BitTimingRequest::new(500.kHz()).with_sample_point(800);
//! let timing = solve(&request, 40.MHz(), &BXCAN).unwrap();
//! assert_eq!(timing.bitrate.to_Hz(), 500_000);
//! assert_eq!(timing.sample_point, 800);
//!
//! // 1 Mbit/s cannot be reached from 1.5 MHz
//! assert!(matches!(
//!     solve(&BitTimingRequest::new(1.MHz()), 1_500.kHz(), &BXCAN),
//!     Err(BitTimingError::ToleranceExceeded { .. })
//! ));
//! ```
//!
//! [`TimingSource`]: can_bittiming_core::TimingSource

pub mod bittiming;
pub mod config;
pub mod fd;

pub use can_bittiming_core as core;
pub use fugit;
