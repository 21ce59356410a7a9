// SPDX-License-Identifier: MIT

//! `machine_load` is a concrete task body (out of scope for this crate,
//! §1) but its FreeBSD open question is preserved here as a documented
//! constant rather than invented behavior (§9).

/// On FreeBSD the reference poller has no brand-agnostic zone listing and
/// so `machine_load` always returns an empty machine set on that platform.
/// Kept as a named constant so a future FreeBSD backend has a single
/// place to flip once it exists.
pub const FREEBSD_MACHINE_LOAD_RETURNS_EMPTY: bool = true;
