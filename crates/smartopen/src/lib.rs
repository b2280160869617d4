pub mod cli;
pub mod enumerate;
pub mod rank;
pub mod serve;
pub mod usage;
