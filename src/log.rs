//! Logging macros
//!
//! With the `defmt` feature the macros forward to `defmt`. On hosted
//! targets they forward to the `log` crate. Otherwise they expand to nothing.

// defmt builds, any target
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { defmt::debug!($($arg)*) }; }
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { defmt::info!($($arg)*) }; }
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => { defmt::error!($($arg)*) }; }
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { defmt::trace!($($arg)*) }; }
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { defmt::warn!($($arg)*) }; }

// Hosted builds log through the `log` facade
#[cfg(all(not(feature = "defmt"), not(target_arch = "arm")))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::__log::debug!($($arg)*) }; }
#[cfg(all(not(feature = "defmt"), not(target_arch = "arm")))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::__log::info!($($arg)*) }; }
#[cfg(all(not(feature = "defmt"), not(target_arch = "arm")))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => { $crate::__log::error!($($arg)*) }; }
#[cfg(all(not(feature = "defmt"), not(target_arch = "arm")))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::__log::trace!($($arg)*) }; }
#[cfg(all(not(feature = "defmt"), not(target_arch = "arm")))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::__log::warn!($($arg)*) }; }

// No-op versions for bare-metal builds without defmt
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => {}; }
