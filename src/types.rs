//! Core type definitions for the simulation kernel.
//!
//! This module defines the fundamental types used throughout the kernel.

/// Simulation time measured in global cycles.
///
/// One global cycle is the period of the frequency registry's global
/// frequency, so every registered clock domain ticks on a whole number of
/// global cycles.
pub type SimTime = u64;

/// Sentinel returned by saturating cycle arithmetic instead of wrapping.
pub const CYCLE_MAX: SimTime = SimTime::MAX;

/// Frequency in hertz.
pub type Freq = u64;

/// One hertz.
pub const HZ: Freq = 1;
/// One kilohertz.
pub const KHZ: Freq = 1_000;
/// One megahertz.
pub const MHZ: Freq = 1_000_000;
/// One gigahertz.
pub const GHZ: Freq = 1_000_000_000;
