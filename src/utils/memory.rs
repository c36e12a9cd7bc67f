//! Returning freed heap pages to the OS between long stretches of classification.

/// Ask the allocator to release free memory. Returns true when something was released.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn reclaim_memory() -> bool {
    // SAFETY: malloc_trim only walks allocator state; 0 keeps no extra padding.
    unsafe { libc::malloc_trim(0) != 0 }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn reclaim_memory() -> bool {
    false
}
