mod data;

pub use data::*;
