//! # Kernel Trace Logging
//!
//! Thin layer over `defmt`, compiled out entirely unless the `defmt`
//! feature is enabled. Trace points sit on task lifecycle transitions
//! and tick expiry; none of them run inside a critical section longer
//! than the state mutation they describe.

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::trace!($s $(, $x)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($( & $x ),*);
    }};
}

pub(crate) use trace;
