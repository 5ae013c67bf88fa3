pub mod algorithm;
pub mod assign;
pub mod common;
pub mod config;
pub mod distance;
pub mod error;
pub mod level;
pub mod solver;
pub mod split;
pub mod stat;
