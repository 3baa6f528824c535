//! 功能模块

pub mod config;
pub mod network;
