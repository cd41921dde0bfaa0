pub mod cancel;
pub mod diag;
pub mod fsio;
pub mod tasks;
