//! Library side of the ctr command

pub mod script;
