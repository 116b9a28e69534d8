//! Desktop shell topology discovery
//!
//! The desktop wallpaper area lives inside a shell-owned `WorkerW` window
//! that Progman only creates lazily, after receiving the undocumented
//! `0x052C` "split" signal. Depending on the Windows generation the icon view
//! (`SHELLDLL_DefView`) ends up either inside one of those `WorkerW` layers
//! (the layer right after it is free for wallpaper content) or stays a direct
//! child of Progman (older/unsplit state, where Progman itself is the only
//! usable parent and content sits above the icons).
//!
//! The shell processes the signal asynchronously and has been observed to
//! ignore a single request, so it is sent a few times with short bounded
//! pauses. No retry loops with backoff: discovery must never block the UI
//! thread for more than a fraction of a second.

use crate::error::EngineError;
use log::{info, warn};
use std::thread::sleep;
use std::time::Duration;
use windows::core::w;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowExW, FindWindowW, SendMessageTimeoutW, SMTO_NORMAL,
};

/// Progman's lazy WorkerW-creation signal.
const WM_SPAWN_WORKERW: u32 = 0x052C;

/// Pause after each split signal; the shell acts on it asynchronously.
const SIGNAL_SETTLE: Duration = Duration::from_millis(100);

/// Result of shell discovery: where to parent the hosting surface.
#[derive(Debug, Clone, Copy)]
pub struct ShellTopology {
    /// The window the hosting surface must be created in.
    pub parent: HWND,
    /// True when no dedicated wallpaper layer exists and content will sit
    /// above the icons (Progman fallback).
    pub degraded: bool,
}

/// Locate the layer the hosting surface should be parented into.
///
/// Never destroys or reorders any shell window; every handle returned here is
/// owned by the shell and only referenced.
pub fn locate_wallpaper_layer(signal_attempts: u32) -> Result<ShellTopology, EngineError> {
    unsafe {
        let progman =
            FindWindowW(w!("Progman"), None).map_err(|_| EngineError::ShellNotFound)?;
        if progman.is_invalid() {
            return Err(EngineError::ShellNotFound);
        }

        // Nudge the shell into splitting off its worker layers. Empirically a
        // single request may be ignored, so send it a few times.
        for _ in 0..signal_attempts.max(1) {
            let mut result = 0usize;
            let _ = SendMessageTimeoutW(
                progman,
                WM_SPAWN_WORKERW,
                WPARAM(0),
                LPARAM(0),
                SMTO_NORMAL,
                1000,
                Some(&mut result),
            );
            sleep(SIGNAL_SETTLE);
        }

        // Walk the top-level WorkerW chain looking for the one that carries
        // the icon view. The WorkerW right after it is the wallpaper layer.
        let mut first_workerw = HWND::default();
        let mut worker = HWND::default();
        loop {
            worker = FindWindowExW(HWND::default(), worker, w!("WorkerW"), None)
                .unwrap_or_default();
            if worker.is_invalid() {
                break;
            }
            if first_workerw.is_invalid() {
                first_workerw = worker;
            }

            let defview = FindWindowExW(worker, HWND::default(), w!("SHELLDLL_DefView"), None)
                .unwrap_or_default();
            if defview.is_invalid() {
                continue;
            }

            let icon_layer = worker;
            let wallpaper = FindWindowExW(HWND::default(), icon_layer, w!("WorkerW"), None)
                .unwrap_or_default();
            if !wallpaper.is_invalid() {
                info!(
                    "Wallpaper layer found behind icon layer ({:?} -> {:?})",
                    icon_layer, wallpaper
                );
                return Ok(ShellTopology {
                    parent: wallpaper,
                    degraded: false,
                });
            }

            // No sibling after the icon layer: host inside the icon layer
            // itself and rely on Z-ordering below the icon view.
            warn!("No WorkerW after icon layer, hosting inside {:?}", icon_layer);
            return Ok(ShellTopology {
                parent: icon_layer,
                degraded: false,
            });
        }

        // No icon layer anywhere. If the icon view is still a direct child of
        // Progman the shell never split; parent into Progman (content will
        // paint above the icons).
        let defview_in_progman =
            FindWindowExW(progman, HWND::default(), w!("SHELLDLL_DefView"), None)
                .unwrap_or_default();
        if !defview_in_progman.is_invalid() {
            warn!("Icon view still inside Progman; split signal ignored, degraded mode");
            return Ok(ShellTopology {
                parent: progman,
                degraded: true,
            });
        }

        if !first_workerw.is_invalid() {
            warn!("Icon view not found; falling back to first WorkerW {:?}", first_workerw);
            return Ok(ShellTopology {
                parent: first_workerw,
                degraded: true,
            });
        }

        Err(EngineError::ShellNotFound)
    }
}
