//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulation board.  All tests run on the host with no real
//! hardware required.

#![cfg(not(target_os = "espidf"))]

mod blink_flow_tests;
mod lifecycle_tests;
mod mock_hw;
