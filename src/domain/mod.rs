pub mod cancel;
pub mod errors;
pub mod indicators;
pub mod market;
pub mod ports;
pub mod simulation;
