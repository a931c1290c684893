//! Prebuilt small-internet simulations and the command line front end for
//! running them.

pub mod cli;
pub mod simulations;
