//! Allocation fault injection. Unit tests arm a failure for the next node or payload allocation
//! to drive the error paths; outside of tests every check compiles down to `Ok(())`.

use std::collections::TryReserveError;

#[cfg(test)]
use std::cell::Cell;

#[cfg(test)]
thread_local! {
    static FAIL_NODE: Cell<bool> = Cell::new(false);
    static FAIL_PAYLOAD: Cell<bool> = Cell::new(false);
}

/// Arms a failure for the next node allocation on this thread.
#[cfg(test)]
pub(crate) fn fail_next_node() {
    FAIL_NODE.with(|flag| flag.set(true));
}

/// Arms a failure for the next payload allocation on this thread.
#[cfg(test)]
pub(crate) fn fail_next_payload() {
    FAIL_PAYLOAD.with(|flag| flag.set(true));
}

#[cfg(test)]
fn injected() -> TryReserveError {
    // Asking for more than isize::MAX bytes fails without touching the allocator.
    Vec::<u8>::new()
        .try_reserve(usize::MAX)
        .expect_err("oversized reservation must fail")
}

#[cfg(test)]
pub(crate) fn node_alloc() -> Result<(), TryReserveError> {
    if FAIL_NODE.with(|flag| flag.replace(false)) {
        return Err(injected());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn payload_alloc() -> Result<(), TryReserveError> {
    if FAIL_PAYLOAD.with(|flag| flag.replace(false)) {
        return Err(injected());
    }
    Ok(())
}

#[cfg(not(test))]
#[inline(always)]
pub(crate) fn node_alloc() -> Result<(), TryReserveError> {
    Ok(())
}

#[cfg(not(test))]
#[inline(always)]
pub(crate) fn payload_alloc() -> Result<(), TryReserveError> {
    Ok(())
}
