//! Small Win32 helpers shared by the windows-only modules.

use log::warn;
use windows::core::{w, HSTRING, PCWSTR};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::ShellExecuteW;
use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

/// Open an address through the OS document-open mechanism (default browser).
/// This intentionally bypasses the rendering sandbox: ad clicks and
/// `OPEN_URL` bridge requests are handled natively, not by the web layer.
pub fn open_url_native(url: &str) {
    let result = unsafe {
        ShellExecuteW(
            HWND::default(),
            w!("open"),
            &HSTRING::from(url),
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // Per ShellExecute contract, values <= 32 are error codes.
    if result.0 as isize <= 32 {
        warn!("ShellExecute failed for '{}' (code {})", url, result.0 as isize);
    }
}
