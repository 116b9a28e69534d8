//! Hosting surface management
//!
//! The engine creates exactly one borderless child window inside the layer
//! returned by shell discovery; WebView2 renders into it. The surface is
//! registered with the resource tracker the moment creation succeeds, kept
//! below the icon view in the Z-order, and made click-transparent at the
//! compositor level so desktop icons stay clickable (input reaches the
//! content through the global hook instead).

use crate::error::EngineError;
use crate::resource_tracker;
use log::{debug, info, warn};
use std::sync::OnceLock;
use windows::core::w;
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::UpdateWindow;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, FindWindowExW, GetWindowLongW,
    RegisterClassW, SetLayeredWindowAttributes, SetWindowLongW, SetWindowPos, ShowWindow,
    SystemParametersInfoW, GWL_EXSTYLE, LWA_ALPHA, SPI_GETWORKAREA, SWP_NOACTIVATE, SWP_NOMOVE,
    SWP_NOSIZE, SW_SHOW, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WNDCLASSW, WS_CHILD,
    WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
    WS_EX_TRANSPARENT, WS_VISIBLE,
};

/// Window class of the hosting surface. The wndproc doubles as the marshal
/// point for input events forwarded from the low-level hook thread.
const SURFACE_CLASS: windows::core::PCWSTR = w!("WebpaperHostSurface");

/// The single child window hosting rendered web content.
#[derive(Debug)]
pub struct HostSurface {
    hwnd: Option<HWND>,
    parent: HWND,
    bounds: RECT,
}

impl HostSurface {
    /// Create the hosting surface inside `parent`, sized to the desktop work
    /// area (screen minus taskbar). Registers the handle with the resource
    /// tracker immediately on success.
    pub fn create(parent: HWND) -> Result<Self, EngineError> {
        ensure_surface_class()?;

        let work_area = desktop_work_area()?;
        let width = work_area.right - work_area.left;
        let height = work_area.bottom - work_area.top;
        debug!("Creating hosting surface {}x{} in {:?}", width, height, parent);

        let hinstance = unsafe {
            GetModuleHandleW(None)
                .map(|h| HINSTANCE(h.0))
                .map_err(|e| EngineError::WindowCreationFailed(e.to_string()))?
        };

        let hwnd = unsafe {
            CreateWindowExW(
                WS_EX_NOACTIVATE | WS_EX_TOOLWINDOW,
                SURFACE_CLASS,
                w!("WebpaperSurface"),
                WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
                0,
                0,
                width,
                height,
                parent,
                None,
                hinstance,
                None,
            )
        }
        .map_err(|e| EngineError::WindowCreationFailed(e.to_string()))?;

        resource_tracker::global().track(hwnd.0 as isize);

        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = UpdateWindow(hwnd);
        }

        info!("Hosting surface created: {:?} ({}x{})", hwnd, width, height);
        Ok(Self {
            hwnd: Some(hwnd),
            parent,
            bounds: RECT {
                left: 0,
                top: 0,
                right: width,
                bottom: height,
            },
        })
    }

    pub fn hwnd(&self) -> Option<HWND> {
        self.hwnd
    }

    /// Client-area rectangle in surface coordinates.
    pub fn client_rect(&self) -> RECT {
        self.bounds
    }

    /// Toggle OS-level mouse transparency. With the flag set, hit-testing
    /// passes straight through to whatever sits below the surface in the
    /// compositor, so desktop icons keep receiving their clicks.
    pub fn set_click_transparent(&self, transparent: bool) {
        let Some(hwnd) = self.hwnd else { return };
        unsafe {
            let mut ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
            if transparent {
                ex_style |= WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0;
            } else {
                ex_style &= !(WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0);
            }
            let _ = SetWindowLongW(hwnd, GWL_EXSTYLE, ex_style as i32);
            if transparent {
                let _ = SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA);
            }
        }
        info!("Surface click-transparency set to {}", transparent);
    }

    /// Keep the icon view painting above the surface regardless of creation
    /// order. Only applies when the icon view shares our parent.
    pub fn place_behind_icons(&self) {
        let Some(hwnd) = self.hwnd else { return };
        unsafe {
            let defview =
                FindWindowExW(self.parent, HWND::default(), w!("SHELLDLL_DefView"), None)
                    .unwrap_or_default();
            if defview.is_invalid() {
                debug!("No icon view inside {:?}, Z-order left as created", self.parent);
                return;
            }
            match SetWindowPos(hwnd, defview, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE)
            {
                Ok(()) => info!("Surface Z-ordered behind icon view {:?}", defview),
                Err(e) => warn!("Failed to Z-order surface behind icons: {}", e),
            }
        }
    }

    /// Release the surface. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(hwnd) = self.hwnd.take() {
            resource_tracker::global().untrack(hwnd.0 as isize);
            unsafe {
                if let Err(e) = DestroyWindow(hwnd) {
                    warn!("DestroyWindow failed for surface {:?}: {}", hwnd, e);
                }
            }
            info!("Hosting surface destroyed");
        }
    }
}

impl Drop for HostSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn desktop_work_area() -> Result<RECT, EngineError> {
    let mut rect = RECT::default();
    unsafe {
        SystemParametersInfoW(
            SPI_GETWORKAREA,
            0,
            Some(&mut rect as *mut RECT as *mut core::ffi::c_void),
            SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
        )
        .map_err(|e| EngineError::WindowCreationFailed(format!("work area query: {e}")))?;
    }
    Ok(rect)
}

fn ensure_surface_class() -> Result<(), EngineError> {
    static CLASS_ONCE: OnceLock<()> = OnceLock::new();
    if CLASS_ONCE.get().is_some() {
        return Ok(());
    }

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| EngineError::WindowCreationFailed(e.to_string()))?
    };

    let class = WNDCLASSW {
        lpfnWndProc: Some(surface_wndproc),
        hInstance: hinstance,
        lpszClassName: SURFACE_CLASS,
        ..Default::default()
    };
    unsafe {
        let _ = RegisterClassW(&class);
    }

    let _ = CLASS_ONCE.set(());
    Ok(())
}

/// Runs on the UI thread that created the surface. Forwarded mouse events
/// posted by the hook thread are dispatched into the rendering session here,
/// which keeps all WebView2 calls on their owning thread.
unsafe extern "system" fn surface_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == crate::input::hook::WM_FORWARD_MOUSE {
        crate::session::dispatch_forwarded_event(hwnd, wparam, lparam);
        return LRESULT(0);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}
