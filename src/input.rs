//! Global mouse interception and event routing
//!
//! A low-level mouse hook watches the whole desktop while interaction mode is
//! on. Every event is classified before anything is forwarded:
//!
//! 1. If the window under the cursor resolves to a visible, titled-or-popup
//!    top-level window that is not part of the desktop shell, a foreground
//!    application is covering that point and the event is dropped — desktop
//!    content must never steal input from apps in front of it.
//! 2. Button releases are hit-tested against the ad-region registry; a match
//!    with a target address opens natively and suppresses forwarding.
//! 3. What remains is forwarded into the rendering session as a synthetic
//!    script-dispatched event, but only while interaction is enabled.
//!
//! The hook observes, it never swallows: every event continues down the OS
//! hook chain regardless of what happens here.
//!
//! Classification and routing are plain functions so they can be exercised
//! without a desktop; the hook plumbing lives in the [`hook`] submodule.

use crate::ad_regions::AdRegionRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mouse event kinds the engine forwards into hosted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    ButtonDown,
    ButtonUp,
}

impl MouseEventKind {
    pub fn as_dom_type(self) -> &'static str {
        match self {
            MouseEventKind::ButtonDown => "mousedown",
            MouseEventKind::ButtonUp => "mouseup",
        }
    }

    fn code(self) -> usize {
        match self {
            MouseEventKind::ButtonDown => 0,
            MouseEventKind::ButtonUp => 1,
        }
    }

    fn from_code(code: usize) -> Option<Self> {
        match code {
            0 => Some(MouseEventKind::ButtonDown),
            1 => Some(MouseEventKind::ButtonUp),
            _ => None,
        }
    }
}

/// Snapshot of the top-level window found under the cursor.
#[derive(Debug, Clone, Default)]
pub struct WindowProbe {
    pub class_name: String,
    pub visible: bool,
    pub titled: bool,
    pub popup: bool,
}

/// Window classes owned by the desktop shell. A window of one of these
/// classes under the cursor means the click landed on the desktop layer, not
/// on a foreground application.
pub fn is_shell_window_class(class_name: &str) -> bool {
    const SHELL_CLASSES: [&str; 6] = [
        "Progman",
        "WorkerW",
        "SHELLDLL_DefView",
        "SysListView32",
        "Shell_TrayWnd",
        "Shell_SecondaryTrayWnd",
    ];
    SHELL_CLASSES
        .iter()
        .any(|c| class_name.eq_ignore_ascii_case(c))
        || class_name.starts_with("Windows.UI.")
}

/// True when the probed window is a real foreground application covering the
/// cursor position, in which case the event must be dropped entirely.
pub fn is_occluding_foreground(probe: &WindowProbe) -> bool {
    probe.visible && (probe.titled || probe.popup) && !is_shell_window_class(&probe.class_name)
}

/// Routing decision for a button-release on the desktop layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseRouting {
    /// Open the address natively and suppress forwarding.
    OpenNative(String),
    /// Forward into the rendering session.
    Forward,
    /// Interaction disabled; nothing to do.
    Drop,
}

/// Decide what happens to a button-release at desktop coordinates `(x, y)`.
/// Ad clicks are handled natively even when they land inside the hosted
/// content, which sidesteps in-content click handling entirely.
pub fn route_button_release(
    regions: &AdRegionRegistry,
    x: i32,
    y: i32,
    interaction_enabled: bool,
) -> ReleaseRouting {
    if let Some(region) = regions.hit_test(x, y) {
        if crate::url_filter::is_openable_web_url(&region.click_url) {
            return ReleaseRouting::OpenNative(region.click_url.clone());
        }
    }
    if interaction_enabled {
        ReleaseRouting::Forward
    } else {
        ReleaseRouting::Drop
    }
}

/// Pack an event for a `PostMessage` hop between the hook thread and the UI
/// thread: kind and button ride in the wparam, client coordinates in the
/// lparam (low word x, high word y, 16-bit signed).
pub fn pack_mouse_event(kind: MouseEventKind, button: u8, x: i32, y: i32) -> (usize, isize) {
    let wparam = kind.code() | ((button as usize) << 8);
    let lparam = ((y as u16 as isize) << 16) | (x as u16 as isize);
    (wparam, lparam)
}

pub fn unpack_mouse_event(wparam: usize, lparam: isize) -> Option<(MouseEventKind, u8, i32, i32)> {
    let kind = MouseEventKind::from_code(wparam & 0xFF)?;
    let button = ((wparam >> 8) & 0xFF) as u8;
    let x = (lparam & 0xFFFF) as u16 as i16 as i32;
    let y = ((lparam >> 16) & 0xFFFF) as u16 as i16 as i32;
    Some((kind, button, x, y))
}

/// Script dispatched into the page for one forwarded event. Mirrors the SDK
/// contract: listeners subscribe to the `webpaper:mouse` custom event.
pub fn mouse_event_script(kind: MouseEventKind, x: i32, y: i32, button: u8) -> String {
    format!(
        "window.dispatchEvent(new CustomEvent('webpaper:mouse',{{detail:{{type:'{}',x:{},y:{},button:{}}}}}));",
        kind.as_dom_type(),
        x,
        y,
        button
    )
}

/// Everything a hook callback needs from the live engine instance.
#[derive(Clone)]
pub struct HookTarget {
    pub surface: isize,
    pub regions: Arc<Mutex<AdRegionRegistry>>,
    pub interaction: Arc<AtomicBool>,
}

/// Coordination between engine calls and the pump thread that services the
/// OS hook. De-targeting never touches the pump: a detached pump keeps
/// running and its callbacks find no target, so a retarget that follows a
/// detarget can never race the pump's teardown into a state where a target
/// is set but no hook exists. The pump stops only at engine shutdown.
struct HookRegistry {
    target: Mutex<Option<HookTarget>>,
    pump_running: AtomicBool,
}

impl HookRegistry {
    const fn new() -> Self {
        Self {
            target: Mutex::new(None),
            pump_running: AtomicBool::new(false),
        }
    }

    /// Point the hook at a live engine instance. True when no pump thread is
    /// running and the caller must spawn one.
    fn retarget(&self, target: HookTarget) -> bool {
        if let Ok(mut slot) = self.target.lock() {
            *slot = Some(target);
        }
        !self.pump_running.swap(true, Ordering::SeqCst)
    }

    /// Detach the hook from the engine; the pump keeps running.
    fn clear_target(&self) {
        if let Ok(mut slot) = self.target.lock() {
            slot.take();
        }
    }

    fn current_target(&self) -> Option<HookTarget> {
        self.target.lock().ok().and_then(|slot| slot.clone())
    }

    /// Called by the pump thread itself as it exits.
    fn mark_pump_stopped(&self) {
        self.pump_running.store(false, Ordering::SeqCst);
    }
}

#[cfg(target_os = "windows")]
pub mod hook {
    //! The low-level hook itself. Runs on a dedicated thread with its own
    //! message pump (`WH_MOUSE_LL` requires one); the active engine instance
    //! is reached through a registration slot that teardown clears before the
    //! session dies, so a late callback finds nothing instead of a dangling
    //! pointer.

    use super::*;
    use crate::util;
    use log::{info, warn};
    use std::sync::atomic::AtomicU32;
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM};
    use windows::Win32::Graphics::Gdi::ScreenToClient;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetAncestor, GetClassNameW, GetMessageW,
        GetWindowLongW, GetWindowTextLengthW, IsWindowVisible, PostMessageW,
        PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx,
        WindowFromPoint, GA_ROOT, GWL_STYLE, HHOOK, MSG, MSLLHOOKSTRUCT, WH_MOUSE_LL, WM_APP,
        WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE, WM_QUIT,
        WM_RBUTTONDOWN, WM_RBUTTONUP, WS_POPUP,
    };

    /// Posted to the hosting surface to marshal a qualifying event onto the
    /// UI thread that owns the rendering session.
    pub const WM_FORWARD_MOUSE: u32 = WM_APP + 0x41;

    static REGISTRY: HookRegistry = HookRegistry::new();
    static HOOK_THREAD_ID: AtomicU32 = AtomicU32::new(0);

    /// Install (or re-target) the global mouse listener.
    pub fn install(target: HookTarget) {
        if !REGISTRY.retarget(target) {
            // Pump already running; the new target takes effect at once.
            return;
        }

        std::thread::spawn(|| {
            unsafe {
                // The hook thread opens URLs via ShellExecute.
                let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);

                HOOK_THREAD_ID.store(GetCurrentThreadId(), Ordering::SeqCst);
                match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), HINSTANCE::default(), 0)
                {
                    Ok(hook) => {
                        info!("Global mouse hook installed");
                        let mut msg = MSG::default();
                        while GetMessageW(&mut msg, HWND::default(), 0, 0).into() {
                            let _ = TranslateMessage(&msg);
                            DispatchMessageW(&msg);
                        }
                        let _ = UnhookWindowsHookEx(hook);
                        info!("Global mouse hook removed");
                    }
                    Err(e) => warn!("Failed to install mouse hook: {}", e),
                }
                HOOK_THREAD_ID.store(0, Ordering::SeqCst);
                REGISTRY.mark_pump_stopped();
            }
        });
    }

    /// Detach the hook from the current engine instance. The pump thread
    /// stays up so a following `install` can retarget it without racing its
    /// teardown; a detached hook forwards nothing.
    pub fn uninstall() {
        REGISTRY.clear_target();
    }

    /// Stop the pump thread entirely. Process teardown only.
    pub fn shutdown() {
        REGISTRY.clear_target();
        let thread_id = HOOK_THREAD_ID.swap(0, Ordering::SeqCst);
        if thread_id != 0 {
            unsafe {
                let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
        }
    }

    unsafe extern "system" fn mouse_hook_proc(
        code: i32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if code >= 0 {
            let info = *(lparam.0 as *const MSLLHOOKSTRUCT);
            handle_mouse_event(wparam.0 as u32, info.pt);
        }
        // Observe-only: the event always continues down the hook chain.
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }

    unsafe fn handle_mouse_event(msg: u32, pt: POINT) {
        let (kind, button) = match msg {
            WM_LBUTTONDOWN => (Some(MouseEventKind::ButtonDown), 0u8),
            WM_LBUTTONUP => (Some(MouseEventKind::ButtonUp), 0),
            WM_MBUTTONDOWN => (Some(MouseEventKind::ButtonDown), 1),
            WM_MBUTTONUP => (Some(MouseEventKind::ButtonUp), 1),
            WM_RBUTTONDOWN => (Some(MouseEventKind::ButtonDown), 2),
            WM_RBUTTONUP => (Some(MouseEventKind::ButtonUp), 2),
            WM_MOUSEMOVE => (None, 0),
            _ => return,
        };

        let Some(target) = REGISTRY.current_target() else {
            return;
        };

        if is_occluding_foreground(&probe_window_at(pt)) {
            return;
        }

        // Moves are classified but never forwarded.
        let Some(kind) = kind else { return };

        let interaction = target.interaction.load(Ordering::SeqCst);

        if kind == MouseEventKind::ButtonUp {
            let routing = match target.regions.lock() {
                Ok(registry) => route_button_release(&registry, pt.x, pt.y, interaction),
                Err(_) => return,
            };
            match routing {
                ReleaseRouting::OpenNative(url) => {
                    info!("Ad region clicked, opening natively: {}", url);
                    util::open_url_native(&url);
                    return;
                }
                ReleaseRouting::Drop => return,
                ReleaseRouting::Forward => {}
            }
        } else if !interaction {
            return;
        }

        forward_event(target.surface, kind, button, pt);
    }

    /// Resolve the top-level window under a desktop point.
    unsafe fn probe_window_at(pt: POINT) -> WindowProbe {
        let under = WindowFromPoint(pt);
        if under.is_invalid() {
            return WindowProbe::default();
        }
        let root = GetAncestor(under, GA_ROOT);
        if root.is_invalid() {
            return WindowProbe::default();
        }

        let mut class_buf = [0u16; 256];
        let len = GetClassNameW(root, &mut class_buf);
        let class_name = if len > 0 {
            String::from_utf16_lossy(&class_buf[..len as usize])
        } else {
            String::new()
        };

        WindowProbe {
            class_name,
            visible: IsWindowVisible(root).as_bool(),
            titled: GetWindowTextLengthW(root) > 0,
            popup: (GetWindowLongW(root, GWL_STYLE) as u32 & WS_POPUP.0) != 0,
        }
    }

    unsafe fn forward_event(surface: isize, kind: MouseEventKind, button: u8, pt: POINT) {
        let surface = HWND(surface as *mut core::ffi::c_void);
        let mut client_pt = pt;
        let _ = ScreenToClient(surface, &mut client_pt);

        let (wparam, lparam) = pack_mouse_event(kind, button, client_pt.x, client_pt.y);
        let _ = PostMessageW(surface, WM_FORWARD_MOUSE, WPARAM(wparam), LPARAM(lparam));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad_regions::AdRegion;

    fn app_window(class: &str) -> WindowProbe {
        WindowProbe {
            class_name: class.to_string(),
            visible: true,
            titled: true,
            popup: false,
        }
    }

    #[test]
    fn test_foreground_app_occludes() {
        // A visible, titled, non-shell top-level window covers the point:
        // the event must never be forwarded.
        assert!(is_occluding_foreground(&app_window("Notepad")));
        assert!(is_occluding_foreground(&app_window("Chrome_WidgetWin_1")));
    }

    #[test]
    fn test_shell_windows_do_not_occlude() {
        for class in ["Progman", "WorkerW", "SHELLDLL_DefView", "SysListView32", "Shell_TrayWnd"] {
            assert!(!is_occluding_foreground(&app_window(class)), "{class}");
        }
        assert!(!is_occluding_foreground(&app_window("Windows.UI.Core.CoreWindow")));
    }

    #[test]
    fn test_invisible_or_untitled_windows_do_not_occlude() {
        let mut probe = app_window("SomeApp");
        probe.visible = false;
        assert!(!is_occluding_foreground(&probe));

        let mut probe = app_window("SomeApp");
        probe.titled = false;
        assert!(!is_occluding_foreground(&probe));

        // Untitled popups still count as occluders.
        probe.popup = true;
        assert!(is_occluding_foreground(&probe));
    }

    fn registry_with_ad() -> AdRegionRegistry {
        let mut registry = AdRegionRegistry::new();
        registry.replace_all(vec![AdRegion {
            id: "ad".to_string(),
            src: String::new(),
            click_url: "http://ad".to_string(),
            left: 0,
            top: 0,
            width: 100,
            height: 100,
            visible: true,
        }]);
        registry
    }

    #[test]
    fn test_release_on_ad_region_opens_natively() {
        let registry = registry_with_ad();
        assert_eq!(
            route_button_release(&registry, 50, 50, true),
            ReleaseRouting::OpenNative("http://ad".to_string())
        );
        // Native handling applies even with interaction disabled.
        assert_eq!(
            route_button_release(&registry, 50, 50, false),
            ReleaseRouting::OpenNative("http://ad".to_string())
        );
    }

    #[test]
    fn test_release_off_ad_region_forwards_when_interactive() {
        let registry = registry_with_ad();
        assert_eq!(route_button_release(&registry, 150, 150, true), ReleaseRouting::Forward);
        assert_eq!(route_button_release(&registry, 150, 150, false), ReleaseRouting::Drop);
    }

    #[test]
    fn test_region_without_target_falls_through() {
        let mut registry = AdRegionRegistry::new();
        registry.replace_all(vec![AdRegion {
            id: "no-target".to_string(),
            src: String::new(),
            click_url: String::new(),
            left: 0,
            top: 0,
            width: 10,
            height: 10,
            visible: true,
        }]);
        assert_eq!(route_button_release(&registry, 5, 5, true), ReleaseRouting::Forward);
    }

    fn live_target() -> HookTarget {
        HookTarget {
            surface: 1,
            regions: Arc::new(Mutex::new(AdRegionRegistry::new())),
            interaction: Arc::new(AtomicBool::new(true)),
        }
    }

    #[test]
    fn test_retarget_after_detarget_reuses_running_pump() {
        let registry = HookRegistry::new();
        // First target needs a pump thread.
        assert!(registry.retarget(live_target()));
        // Detaching leaves the pump up; callbacks just find no target.
        registry.clear_target();
        assert!(registry.current_target().is_none());
        // A retarget while the pump is alive must not ask for a second pump,
        // and the hook must be live again immediately.
        assert!(!registry.retarget(live_target()));
        assert!(registry.current_target().is_some());
        // Only after the pump reports itself gone does a retarget spawn anew.
        registry.mark_pump_stopped();
        assert!(registry.retarget(live_target()));
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let cases = [
            (MouseEventKind::ButtonDown, 0u8, 0, 0),
            (MouseEventKind::ButtonUp, 2, 1919, 1079),
            (MouseEventKind::ButtonDown, 1, -5, 30),
        ];
        for (kind, button, x, y) in cases {
            let (wparam, lparam) = pack_mouse_event(kind, button, x, y);
            assert_eq!(unpack_mouse_event(wparam, lparam), Some((kind, button, x, y)));
        }
        assert_eq!(unpack_mouse_event(0xFF, 0), None);
    }

    #[test]
    fn test_mouse_event_script_shape() {
        let script = mouse_event_script(MouseEventKind::ButtonUp, 10, 20, 0);
        assert!(script.contains("'mouseup'"));
        assert!(script.contains("x:10"));
        assert!(script.contains("y:20"));
        assert!(script.contains("webpaper:mouse"));
    }
}
