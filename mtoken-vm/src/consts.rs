//! VM parameters

/// Value stack capacity; the runtime limit may be configured lower.
pub const STACK_SIZE: usize = 256;

/// Return-address stack capacity; also bounds the saved-locals frames.
pub const RET_STACK_SIZE: usize = 32;

/// Locals per frame, addressed by De Bruijn-style indices `0..63`.
pub const LOCALS_SIZE: usize = 64;

/// Global slots shared across frames.
pub const GLOBALS_SIZE: usize = 128;

/// Default step limit applied at construction.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Hard upper bound on the call depth limit.
pub const CALL_DEPTH_MAX: usize = 32;

/// Maximum entries recorded by a simulation trace.
pub const MAX_TRACE: usize = 1024;

/// Capability bitmap width in bytes; one bit per device id `0..=255`.
pub const CAPS_BYTES: usize = 32;

/// Sanity cap for a single `ALLOC` request, in bytes.
pub const ALLOC_MAX_BYTES: i64 = 1_000_000;

/// Sanity cap for a single `NEWARR` request, in elements.
pub const ARRAY_MAX_LEN: i64 = 1_000_000;

/// Allocations between automatic collections when auto-GC is enabled.
pub const DEFAULT_GC_THRESHOLD: usize = 100;
