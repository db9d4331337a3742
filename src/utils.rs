//! Internal helper macros.

/// Early-return with an error when a condition does not hold.
///
/// Like `assert!`, but produces an `Err` instead of panicking, which keeps
/// validation checks in the decoders on the `?`-propagation path.
///
/// # Example
///
/// ```ignore
/// ensure!(size + H_SIZE <= MAX_PACKET_SIZE, AjpError::packet_too_large(size));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
