//! Application core: the blink logic, isolated from the board.
//!
//! [`controller`] holds the mode state machine and the toggler task,
//! [`lifecycle`] wires them to a [`Board`](ports::Board) in the right order
//! and tears everything down again.  All hardware access goes through the
//! traits in [`ports`], so this layer runs unchanged against the simulation
//! board in tests.

pub mod controller;
pub mod events;
pub mod lifecycle;
pub mod ports;
