//! C types and entry-point signatures of the two interface generations.
//!
//! The two generations disagree on symbol names, on the width of the boolean
//! type, and on how callbacks are passed to instantiation, so each lives in
//! its own module. Status codes share one encoding.

use std::os::raw::c_int;

pub mod v1;
pub mod v2;

/// Raw status code returned by every status-returning entry point.
pub type RawStatus = c_int;

pub const STATUS_OK: RawStatus = 0;
pub const STATUS_WARNING: RawStatus = 1;
pub const STATUS_DISCARD: RawStatus = 2;
pub const STATUS_ERROR: RawStatus = 3;
pub const STATUS_FATAL: RawStatus = 4;
pub const STATUS_PENDING: RawStatus = 5;

/// Raw selector for the co-simulation status queries.
pub type RawStatusKind = c_int;
