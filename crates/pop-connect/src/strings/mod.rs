// SPDX-License-Identifier: GPL-3.0

//! Centralized string constants for the pop-connect crate.

pub mod rpc;
