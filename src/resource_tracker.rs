//! Last-resort window handle tracking
//!
//! Every OS window this engine creates is registered here the moment creation
//! succeeds and unregistered on orderly teardown. Whatever is still tracked
//! when the process (or hosting plugin) shuts down gets force-destroyed, so a
//! failed teardown path cannot leak desktop-level windows.

use log::{info, warn};
use std::sync::Mutex;

/// Registry of live window handles created by this engine.
///
/// Handles are stored as raw `isize` values so the registry itself stays
/// platform-neutral and lock-friendly; only `cleanup_all` touches the OS.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    handles: Mutex<Vec<isize>>,
}

impl ResourceTracker {
    pub const fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn track(&self, handle: isize) {
        let mut handles = self.handles.lock().expect("resource tracker poisoned");
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    pub fn untrack(&self, handle: isize) {
        let mut handles = self.handles.lock().expect("resource tracker poisoned");
        handles.retain(|&h| h != handle);
    }

    pub fn tracked_count(&self) -> usize {
        self.handles.lock().expect("resource tracker poisoned").len()
    }

    /// Force-destroy every handle still registered. Called at process/plugin
    /// teardown after the orderly stop path has run.
    pub fn cleanup_all(&self) {
        let leaked: Vec<isize> = {
            let mut handles = self.handles.lock().expect("resource tracker poisoned");
            std::mem::take(&mut *handles)
        };

        if leaked.is_empty() {
            return;
        }

        warn!("Resource tracker closing {} leaked window(s)", leaked.len());
        for handle in leaked {
            destroy_native_window(handle);
        }
    }
}

/// Process-wide tracker instance used by the engine.
pub fn global() -> &'static ResourceTracker {
    static GLOBAL: ResourceTracker = ResourceTracker::new();
    &GLOBAL
}

#[cfg(target_os = "windows")]
fn destroy_native_window(handle: isize) {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{DestroyWindow, IsWindow};

    let hwnd = HWND(handle as *mut core::ffi::c_void);
    unsafe {
        if IsWindow(hwnd).as_bool() {
            match DestroyWindow(hwnd) {
                Ok(()) => info!("Destroyed leaked window handle {:#x}", handle),
                Err(e) => warn!("Failed to destroy leaked window {:#x}: {}", handle, e),
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn destroy_native_window(handle: isize) {
    info!("Dropping tracked handle {:#x} (no native window backend)", handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_untrack_counts() {
        let tracker = ResourceTracker::new();
        for h in 1..=5 {
            tracker.track(h);
        }
        assert_eq!(tracker.tracked_count(), 5);

        tracker.untrack(2);
        tracker.untrack(4);
        assert_eq!(tracker.tracked_count(), 3);
    }

    #[test]
    fn test_track_is_idempotent_per_handle() {
        let tracker = ResourceTracker::new();
        tracker.track(42);
        tracker.track(42);
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[test]
    fn test_untrack_unknown_handle_is_noop() {
        let tracker = ResourceTracker::new();
        tracker.track(7);
        tracker.untrack(999);
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[test]
    fn test_cleanup_all_empties_registry() {
        let tracker = ResourceTracker::new();
        for h in 10..20 {
            tracker.track(h);
        }
        tracker.cleanup_all();
        assert_eq!(tracker.tracked_count(), 0);
        // Second pass on an empty registry must be harmless.
        tracker.cleanup_all();
        assert_eq!(tracker.tracked_count(), 0);
    }
}
