//! Logging shims. Emits through `tracing` when the `tracing` feature is on, and compiles to
//! nothing otherwise. Declared first in the crate with `#[macro_use]`, so the macros are in
//! textual scope everywhere without imports.

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($t: tt)*) => { ::tracing::debug!($($t)*) };
}

#[cfg(feature = "tracing")]
macro_rules! info {
    ($($t: tt)*) => { ::tracing::info!($($t)*) };
}

#[cfg(feature = "tracing")]
macro_rules! warn {
    ($($t: tt)*) => { ::tracing::warn!($($t)*) };
}

#[cfg(feature = "tracing")]
macro_rules! error {
    ($($t: tt)*) => { ::tracing::error!($($t)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($t: tt)*) => {};
}
