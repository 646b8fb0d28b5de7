// A broken split/merge invariant means the index structures are corrupted. Debug builds abort
// right away; release builds log the corruption and keep going.
macro_rules! consistency_violation {
    ($($arg:tt)+) => {{
        log::error!("power2 allocator consistency violation: {}", format_args!($($arg)+));
        debug_assert!(false, $($arg)+);
    }};
}
