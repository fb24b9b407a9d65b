#![deny(unsafe_code)]
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod config;
pub mod driver;
pub mod json;
pub mod payload;
pub mod poll;
pub mod publish;
pub mod ranger;
pub mod relay;
pub mod state;

#[cfg(test)]
mod testing;

cfg_if::cfg_if! {
    if #[cfg(feature = "firmware")] {
        pub mod net;
    }
}
