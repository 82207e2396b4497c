//! Result codes exchanged with the ability-manager, the directory service
//! and the peer device.
//!
//! Codes travel as plain `i32` on the wire so that an older peer can still
//! read them; `0` is always success.

/// Success.
pub const ERR_OK: i32 = 0;

/// Generic invalid-value failure (ability gone, missing descriptor).
pub const ERR_INVALID_VALUE: i32 = 22;

/// Peer failed to restore the state bag during a reversal.
pub const ABILITY_FAILED_RESTORE_DATA: i32 = 29_360_196;

/// The ability declined to start a continuation.
pub const CONTINUE_ABILITY_REJECTED: i32 = 29_360_197;

/// The ability failed to serialize its state.
pub const CONTINUE_SAVE_DATA_FAILED: i32 = 29_360_198;

/// The combined continue callback failed.
pub const CONTINUE_ON_CONTINUE_FAILED: i32 = 29_360_199;

/// Whether `code` denotes success.
#[must_use]
pub const fn is_ok(code: i32) -> bool {
    code == ERR_OK
}
