pub mod lead;
pub mod order;
pub mod package;
pub mod region;
