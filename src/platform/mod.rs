//! Platform abstraction: process-termination decoding and errno values.

pub mod process;
