//! Internal modules shipped with the bot

pub mod base;

pub use base::BaseModule;
