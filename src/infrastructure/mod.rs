pub mod binance;
pub mod core;
pub mod datasets;
pub mod twelvedata;
