//! Concrete device drivers.

pub mod escpos;

pub use escpos::{EscPosModel, EscPosPrinter};
