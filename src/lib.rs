// lib.rs

//! Per-sample QC metrics (normalized magnitude, xydiff) computed from
//! binary SIM intensity files.

pub mod output;
pub mod qc;
pub mod sim;
