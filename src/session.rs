//! Rendering session lifecycle
//!
//! Owns the WebView2 environment/controller/content triple that renders into
//! the hosting surface. The environment is expensive to create and lives for
//! the whole process; controllers and content handles are per-session and die
//! with the wallpaper.
//!
//! All calls in this module must run on the UI thread that owns the hosting
//! surface — WebView2 is apartment-threaded and its async completions are
//! pumped on that same thread (`wait_for_async_operation`), which also means
//! creation failures propagate through the returned `Result` instead of
//! vanishing behind a flag.

use crate::ad_regions::AdRegionRegistry;
use crate::bridge::{self, BridgeMessage};
use crate::error::EngineError;
use crate::url_filter::UrlValidator;
use crate::util;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use webview2_com::Microsoft::Web::WebView2::Win32::{
    CreateCoreWebView2EnvironmentWithOptions, ICoreWebView2, ICoreWebView2Controller,
    ICoreWebView2Environment, ICoreWebView2EnvironmentOptions,
    COREWEBVIEW2_PERMISSION_KIND_CAMERA, COREWEBVIEW2_PERMISSION_KIND_CLIPBOARD_READ,
    COREWEBVIEW2_PERMISSION_KIND_GEOLOCATION, COREWEBVIEW2_PERMISSION_KIND_MICROPHONE,
    COREWEBVIEW2_PERMISSION_STATE_DEFAULT, COREWEBVIEW2_PERMISSION_STATE_DENY,
};
use webview2_com::{
    take_pwstr, CoreWebView2EnvironmentOptions, CreateCoreWebView2ControllerCompletedHandler,
    CreateCoreWebView2EnvironmentCompletedHandler, NavigationCompletedEventHandler,
    NavigationStartingEventHandler, PermissionRequestedEventHandler,
    WebMessageReceivedEventHandler,
};
use windows::core::{Error as WinError, HSTRING, PWSTR};
use windows::Win32::Foundation::{BOOL, E_POINTER, HWND, LPARAM, RECT, WPARAM};
use windows::Win32::System::WinRT::EventRegistrationToken;

thread_local! {
    // Environment cache: one per process in practice, since every session is
    // created from the single UI thread.
    static CACHED_ENVIRONMENT: RefCell<Option<ICoreWebView2Environment>> =
        const { RefCell::new(None) };

    // Surfaces currently accepting forwarded input, keyed by surface handle.
    // Only touched from the UI thread (wndproc and session setup/teardown),
    // so registration and removal cannot race a live dispatch.
    static DISPATCH_TARGETS: RefCell<HashMap<isize, ICoreWebView2>> =
        RefCell::new(HashMap::new());
}

/// Process-wide WebView2 environment service. Creating the environment is the
/// expensive part of initialization, so the first successful creation is
/// cached and every later session reuses it.
#[derive(Debug, Clone)]
pub struct SharedEnvironment {
    user_data_dir: PathBuf,
}

impl SharedEnvironment {
    pub fn new(user_data_dir: PathBuf) -> Self {
        Self { user_data_dir }
    }

    pub fn get_or_create(&self) -> Result<ICoreWebView2Environment, EngineError> {
        if let Some(env) = CACHED_ENVIRONMENT.with(|c| c.borrow().clone()) {
            debug!("Reusing cached WebView2 environment");
            return Ok(env);
        }

        let env = create_environment(&self.user_data_dir)?;
        CACHED_ENVIRONMENT.with(|c| *c.borrow_mut() = Some(env.clone()));
        Ok(env)
    }

    /// Drop the cached environment. Part of process teardown only; sessions
    /// never release the environment themselves.
    pub fn reset() {
        CACHED_ENVIRONMENT.with(|c| c.borrow_mut().take());
    }
}

struct RenderingSession {
    controller: ICoreWebView2Controller,
    webview: ICoreWebView2,
    surface: HWND,
    initialized: bool,
}

/// Controller for the single rendering session.
pub struct RenderingSessionController {
    environment: SharedEnvironment,
    validator: Arc<UrlValidator>,
    regions: Arc<Mutex<AdRegionRegistry>>,
    interaction: Arc<AtomicBool>,
    session: Option<RenderingSession>,
}

impl RenderingSessionController {
    pub fn new(
        environment: SharedEnvironment,
        validator: Arc<UrlValidator>,
        regions: Arc<Mutex<AdRegionRegistry>>,
        interaction: Arc<AtomicBool>,
    ) -> Self {
        Self {
            environment,
            validator,
            regions,
            interaction,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().map(|s| s.initialized).unwrap_or(false)
    }

    /// Create the controller inside the hosting surface, wire policy and the
    /// message bridge, and issue the initial navigation.
    ///
    /// Failure after controller creation closes the controller before
    /// returning, and the dispatch table only learns about the surface once
    /// the initial navigation has been accepted, so an aborted start leaves
    /// no half-configured controller and no stale forwarding entry behind.
    pub fn start(&mut self, surface: HWND, bounds: RECT, url: &str) -> Result<(), EngineError> {
        if self.session.is_some() {
            self.stop();
        }

        let environment = self.environment.get_or_create()?;
        let controller = create_controller(&environment, surface)?;

        let webview = match self.wire_session(&controller, bounds, url) {
            Ok(webview) => webview,
            Err(e) => {
                unsafe {
                    if let Err(close_err) = controller.Close() {
                        warn!("Controller close after aborted start failed: {}", close_err);
                    }
                }
                return Err(e);
            }
        };

        register_dispatch_target(surface.0 as isize, webview.clone());
        info!("Rendering session started, navigating to {}", url);

        self.session = Some(RenderingSession {
            controller,
            webview,
            surface,
            initialized: true,
        });
        Ok(())
    }

    /// Everything between controller creation and a successfully issued
    /// initial navigation.
    fn wire_session(
        &self,
        controller: &ICoreWebView2Controller,
        bounds: RECT,
        url: &str,
    ) -> Result<ICoreWebView2, EngineError> {
        unsafe {
            controller
                .SetBounds(bounds)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("SetBounds: {e}")))?;
            controller
                .SetIsVisible(true)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("SetIsVisible: {e}")))?;
        }

        let webview = unsafe {
            controller
                .CoreWebView2()
                .map_err(|e| EngineError::ControllerCreationFailed(format!("CoreWebView2: {e}")))?
        };

        self.install_navigation_policy(&webview)?;
        self.install_permission_policy(&webview)?;
        self.install_message_bridge(&webview)?;
        self.install_load_announcer(&webview)?;

        unsafe {
            webview
                .Navigate(&HSTRING::from(url))
                .map_err(|e| EngineError::NavigationFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(webview)
    }

    /// Navigate the live session. Fails without a session or when the URL is
    /// rejected by policy.
    pub fn navigate(&self, url: &str) -> Result<(), EngineError> {
        if !self.validator.is_allowed(url) {
            return Err(EngineError::UrlRejected(url.to_string()));
        }
        let session = self.session.as_ref().ok_or_else(|| EngineError::NavigationFailed {
            url: url.to_string(),
            reason: "no active rendering session".to_string(),
        })?;
        unsafe {
            session
                .webview
                .Navigate(&HSTRING::from(url))
                .map_err(|e| EngineError::NavigationFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }
        info!("Navigated to {}", url);
        Ok(())
    }

    /// Force a full reload of the hosted content. This is the cache-clearing
    /// strategy; no finer-grained cache API is assumed available.
    pub fn reload(&self) {
        if let Some(session) = &self.session {
            unsafe {
                if let Err(e) = session.webview.Reload() {
                    warn!("Reload failed: {}", e);
                } else {
                    info!("Hosted content reloaded");
                }
            }
        }
    }

    /// Run a script inside the hosted page.
    pub fn execute_script(&self, script: &str) {
        if let Some(session) = &self.session {
            unsafe {
                if let Err(e) = session.webview.ExecuteScript(&HSTRING::from(script), None) {
                    warn!("ExecuteScript failed: {}", e);
                }
            }
        }
    }

    /// Close the controller and drop the session-scoped handles. The shared
    /// environment stays alive for the next session.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            unregister_dispatch_target(session.surface.0 as isize);
            unsafe {
                if let Err(e) = session.controller.Close() {
                    warn!("Controller close failed: {}", e);
                }
            }
            info!("Rendering session stopped");
        }
    }

    fn install_navigation_policy(&self, webview: &ICoreWebView2) -> Result<(), EngineError> {
        let validator = self.validator.clone();
        let handler = NavigationStartingEventHandler::create(Box::new(move |_webview, args| {
            if let Some(args) = args {
                let mut uri = PWSTR::null();
                unsafe { args.Uri(&mut uri)? };
                let uri = take_pwstr(uri);
                if !validator.is_allowed(&uri) {
                    warn!("Blocking in-page navigation to {}", uri);
                    unsafe { args.SetCancel(true)? };
                }
            }
            Ok(())
        }));

        let mut token = EventRegistrationToken::default();
        unsafe {
            webview
                .add_NavigationStarting(&handler, &mut token)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("NavigationStarting: {e}")))
        }
    }

    fn install_permission_policy(&self, webview: &ICoreWebView2) -> Result<(), EngineError> {
        let handler = PermissionRequestedEventHandler::create(Box::new(move |_webview, args| {
            if let Some(args) = args {
                let mut kind = Default::default();
                unsafe { args.PermissionKind(&mut kind)? };
                // Wallpapers have no business with the user's sensors or
                // clipboard; everything else keeps the engine default.
                let state = if kind == COREWEBVIEW2_PERMISSION_KIND_MICROPHONE
                    || kind == COREWEBVIEW2_PERMISSION_KIND_CAMERA
                    || kind == COREWEBVIEW2_PERMISSION_KIND_GEOLOCATION
                    || kind == COREWEBVIEW2_PERMISSION_KIND_CLIPBOARD_READ
                {
                    debug!("Denying permission request kind {:?}", kind);
                    COREWEBVIEW2_PERMISSION_STATE_DENY
                } else {
                    COREWEBVIEW2_PERMISSION_STATE_DEFAULT
                };
                unsafe { args.SetState(state)? };
            }
            Ok(())
        }));

        let mut token = EventRegistrationToken::default();
        unsafe {
            webview
                .add_PermissionRequested(&handler, &mut token)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("PermissionRequested: {e}")))
        }
    }

    fn install_message_bridge(&self, webview: &ICoreWebView2) -> Result<(), EngineError> {
        let regions = self.regions.clone();
        let handler = WebMessageReceivedEventHandler::create(Box::new(move |_webview, args| {
            if let Some(args) = args {
                let mut raw = PWSTR::null();
                unsafe { args.WebMessageAsJson(&mut raw)? };
                let raw = take_pwstr(raw);
                handle_bridge_message(&raw, &regions);
            }
            Ok(())
        }));

        let mut token = EventRegistrationToken::default();
        unsafe {
            webview
                .add_WebMessageReceived(&handler, &mut token)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("WebMessageReceived: {e}")))
        }
    }

    /// After the first successful page load, tell the page whether input
    /// forwarding is active so it can adjust its own hit handling.
    fn install_load_announcer(&self, webview: &ICoreWebView2) -> Result<(), EngineError> {
        let interaction = self.interaction.clone();
        let mut announced = false;
        let handler = NavigationCompletedEventHandler::create(Box::new(move |webview, args| {
            if announced {
                return Ok(());
            }
            let mut success = BOOL::default();
            if let Some(args) = args {
                unsafe { args.IsSuccess(&mut success)? };
            }
            if success.as_bool() {
                if let Some(webview) = webview {
                    let enabled = interaction.load(Ordering::SeqCst);
                    let script = interaction_mode_script(enabled);
                    unsafe { webview.ExecuteScript(&HSTRING::from(script), None)? };
                    info!("Announced interaction mode to page: {}", enabled);
                    announced = true;
                }
            }
            Ok(())
        }));

        let mut token = EventRegistrationToken::default();
        unsafe {
            webview
                .add_NavigationCompleted(&handler, &mut token)
                .map_err(|e| EngineError::ControllerCreationFailed(format!("NavigationCompleted: {e}")))
        }
    }
}

impl Drop for RenderingSessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_bridge_message(raw: &str, regions: &Arc<Mutex<AdRegionRegistry>>) {
    match bridge::parse_message(raw) {
        BridgeMessage::IframeData(list) => {
            let count = list.len();
            if let Ok(mut registry) = regions.lock() {
                registry.replace_all(list);
            }
            debug!("Ad-region set replaced ({} region(s))", count);
        }
        BridgeMessage::OpenUrl { url: Some(url) } => {
            if crate::url_filter::is_openable_web_url(&url) {
                info!("Page requested native open of {}", url);
                util::open_url_native(&url);
            } else {
                warn!("Refusing native open of non-web address: {}", url);
            }
        }
        BridgeMessage::OpenUrl { url: None } => {
            warn!("OPEN_URL message without url field, ignored");
        }
        BridgeMessage::Ready { name } => {
            info!("Wallpaper ready: {}", name.as_deref().unwrap_or("(unnamed)"));
        }
        BridgeMessage::Log { message } => {
            info!("[page] {}", message.as_deref().unwrap_or(""));
        }
        BridgeMessage::Unknown { raw } => {
            info!("Unrecognized bridge message: {}", raw);
        }
        BridgeMessage::Malformed => {}
    }
}

pub(crate) fn interaction_mode_script(enabled: bool) -> String {
    format!(
        "window.dispatchEvent(new CustomEvent('webpaper:interactionMode',{{detail:{{enabled:{enabled}}}}}));"
    )
}

fn register_dispatch_target(surface: isize, webview: ICoreWebView2) {
    DISPATCH_TARGETS.with(|targets| {
        targets.borrow_mut().insert(surface, webview);
    });
}

fn unregister_dispatch_target(surface: isize) {
    DISPATCH_TARGETS.with(|targets| {
        targets.borrow_mut().remove(&surface);
    });
}

/// Called from the hosting surface's wndproc when the hook thread posts a
/// qualifying mouse event. Runs on the UI thread, so dispatching into the
/// session is safe here and nowhere else.
pub(crate) fn dispatch_forwarded_event(surface: HWND, wparam: WPARAM, lparam: LPARAM) {
    let Some((kind, button, x, y)) = crate::input::unpack_mouse_event(wparam.0, lparam.0)
    else {
        return;
    };

    let webview = DISPATCH_TARGETS.with(|targets| targets.borrow().get(&(surface.0 as isize)).cloned());
    let Some(webview) = webview else { return };

    let script = crate::input::mouse_event_script(kind, x, y, button);
    unsafe {
        if let Err(e) = webview.ExecuteScript(&HSTRING::from(script), None) {
            warn!("Forwarded event dispatch failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_to_unregistered_surface_is_a_noop() {
        // A surface the dispatch table has never seen (or that an aborted
        // start never registered) must be ignored without side effects.
        let surface = HWND(0x4242 as *mut core::ffi::c_void);
        dispatch_forwarded_event(surface, WPARAM(0), LPARAM(0));
        assert!(DISPATCH_TARGETS.with(|targets| targets.borrow().is_empty()));
    }
}

fn create_environment(user_data_dir: &Path) -> Result<ICoreWebView2Environment, EngineError> {
    if let Err(e) = std::fs::create_dir_all(user_data_dir) {
        warn!(
            "Could not create user data dir {}: {}",
            user_data_dir.display(),
            e
        );
    }
    info!(
        "Creating WebView2 environment (profile: {})",
        user_data_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    let folder = HSTRING::from(user_data_dir.as_os_str());
    let options = CoreWebView2EnvironmentOptions::default();

    CreateCoreWebView2EnvironmentCompletedHandler::wait_for_async_operation(
        Box::new(move |handler| unsafe {
            CreateCoreWebView2EnvironmentWithOptions(
                windows::core::PCWSTR::null(),
                &folder,
                &ICoreWebView2EnvironmentOptions::from(options),
                &handler,
            )
            .map_err(webview2_com::Error::WindowsError)
        }),
        Box::new(move |error_code, environment| {
            error_code?;
            tx.send(environment.ok_or_else(|| WinError::from(E_POINTER)))
                .expect("send WebView2 environment");
            Ok(())
        }),
    )
    .map_err(|e| EngineError::EnvironmentCreationFailed(format!("{e:?}")))?;

    rx.recv()
        .map_err(|_| EngineError::EnvironmentCreationFailed("environment channel closed".into()))?
        .map_err(|e| {
            error!("WebView2 environment creation failed: {e}");
            EngineError::EnvironmentCreationFailed(e.to_string())
        })
}

fn create_controller(
    environment: &ICoreWebView2Environment,
    surface: HWND,
) -> Result<ICoreWebView2Controller, EngineError> {
    let (tx, rx) = mpsc::channel();
    let environment = environment.clone();

    CreateCoreWebView2ControllerCompletedHandler::wait_for_async_operation(
        Box::new(move |handler| unsafe {
            environment
                .CreateCoreWebView2Controller(surface, &handler)
                .map_err(webview2_com::Error::WindowsError)
        }),
        Box::new(move |error_code, controller| {
            error_code?;
            tx.send(controller.ok_or_else(|| WinError::from(E_POINTER)))
                .expect("send WebView2 controller");
            Ok(())
        }),
    )
    .map_err(|e| EngineError::ControllerCreationFailed(format!("{e:?}")))?;

    rx.recv()
        .map_err(|_| EngineError::ControllerCreationFailed("controller channel closed".into()))?
        .map_err(|e| {
            error!("WebView2 controller creation failed: {e}");
            EngineError::ControllerCreationFailed(e.to_string())
        })
}
