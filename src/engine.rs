//! Wallpaper engine lifecycle
//!
//! Top-level orchestration: shell discovery, surface creation, rendering
//! session start, input hook wiring, and the retry/maintenance machinery that
//! keeps the wallpaper alive across shell restarts. Commands land here and
//! come back as booleans; every failure path logs the reason and leaves the
//! engine in a state from which another `initialize` attempt is valid.

use std::time::{Duration, Instant};

/// Run `op` up to `max_attempts` times, sleeping `delay` between failed
/// attempts (never after the last one). Returns whether any attempt
/// succeeded.
pub fn run_with_retry<F>(max_attempts: u32, delay: Duration, mut op: F) -> bool
where
    F: FnMut() -> bool,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        if op() {
            return true;
        }
        if attempt < attempts {
            std::thread::sleep(delay);
        }
    }
    false
}

/// Interval gate for periodic housekeeping. Work is performed opportunistically
/// on command boundaries rather than from a timer thread, so this only answers
/// "is it time yet".
#[derive(Debug)]
pub struct MaintenanceClock {
    interval: Duration,
    last_run: Instant,
}

impl MaintenanceClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Instant::now(),
        }
    }

    /// True at most once per interval; checking marks the work as done.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_run) >= self.interval {
            self.last_run = now;
            true
        } else {
            false
        }
    }
}

#[cfg(target_os = "windows")]
pub use windows_impl::{EngineState, WallpaperEngine};

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::{run_with_retry, MaintenanceClock};
    use crate::ad_regions::AdRegionRegistry;
    use crate::config::EngineConfig;
    use crate::host_surface::HostSurface;
    use crate::input::{hook, HookTarget};
    use crate::resource_tracker;
    use crate::session::{RenderingSessionController, SharedEnvironment};
    use crate::shell;
    use crate::url_filter::UrlValidator;
    use log::{error, info, warn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    const RETRY_DELAY: Duration = Duration::from_secs(1);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EngineState {
        Stopped,
        Initializing,
        Running,
    }

    /// The engine proper. One instance per process, owned by the UI thread.
    pub struct WallpaperEngine {
        config: EngineConfig,
        validator: Arc<UrlValidator>,
        session: RenderingSessionController,
        surface: Option<HostSurface>,
        regions: Arc<Mutex<AdRegionRegistry>>,
        interaction: Arc<AtomicBool>,
        state: EngineState,
        maintenance: MaintenanceClock,
    }

    impl WallpaperEngine {
        pub fn new(config: EngineConfig) -> Self {
            let validator = Arc::new(UrlValidator::new(
                config.whitelist.clone(),
                config.blacklist.clone(),
            ));
            let regions = Arc::new(Mutex::new(AdRegionRegistry::new()));
            let interaction = Arc::new(AtomicBool::new(false));
            let environment = SharedEnvironment::new(config.resolve_user_data_dir());
            let maintenance = MaintenanceClock::new(config.cache_clear_interval());

            Self {
                session: RenderingSessionController::new(
                    environment,
                    validator.clone(),
                    regions.clone(),
                    interaction.clone(),
                ),
                validator,
                regions,
                interaction,
                state: EngineState::Stopped,
                maintenance,
                config,
            }
        }

        pub fn state(&self) -> EngineState {
            self.state
        }

        /// Stand up the wallpaper: discover the shell layer, create the
        /// hosting surface, start rendering, and wire input. Boolean result;
        /// the reason for a failure is in the log.
        pub fn initialize_wallpaper(&mut self, url: &str, mouse_transparent: bool) -> bool {
            match self.try_initialize(url, mouse_transparent) {
                Ok(()) => true,
                Err(e) => {
                    error!("Wallpaper initialization failed: {}", e);
                    self.teardown();
                    false
                }
            }
        }

        /// Initialization with bounded retries. Shell discovery is flaky right
        /// after an Explorer restart, so a failed attempt is worth repeating.
        pub fn initialize_with_retry(
            &mut self,
            url: &str,
            mouse_transparent: bool,
            max_retries: u32,
        ) -> bool {
            run_with_retry(max_retries, RETRY_DELAY, || {
                self.initialize_wallpaper(url, mouse_transparent)
            })
        }

        fn try_initialize(
            &mut self,
            url: &str,
            mouse_transparent: bool,
        ) -> Result<(), crate::error::EngineError> {
            if !self.validator.is_allowed(url) {
                return Err(crate::error::EngineError::UrlRejected(url.to_string()));
            }

            if self.state == EngineState::Running {
                info!("Engine already running, restarting with new content");
                self.stop_wallpaper();
            }
            self.state = EngineState::Initializing;
            self.run_maintenance();

            let topology = shell::locate_wallpaper_layer(self.config.shell_signal_attempts)?;
            if topology.degraded {
                warn!("Shell split unavailable, content will cover desktop icons");
            }

            let surface = HostSurface::create(topology.parent)?;
            surface.place_behind_icons();
            // The surface itself never takes OS clicks; interactive input goes
            // through the global hook.
            surface.set_click_transparent(true);

            self.interaction
                .store(!mouse_transparent, Ordering::SeqCst);

            let surface_hwnd = surface
                .hwnd()
                .ok_or_else(|| crate::error::EngineError::WindowCreationFailed("no handle".into()))?;
            self.session
                .start(surface_hwnd, surface.client_rect(), url)?;

            if !mouse_transparent {
                hook::install(HookTarget {
                    surface: surface_hwnd.0 as isize,
                    regions: self.regions.clone(),
                    interaction: self.interaction.clone(),
                });
            }

            self.surface = Some(surface);
            self.state = EngineState::Running;
            info!(
                "Wallpaper running (url: {}, interactive: {})",
                url, !mouse_transparent
            );
            Ok(())
        }

        /// Tear the wallpaper down. Idempotent; always reports success so
        /// callers can fold it into shutdown paths unconditionally.
        pub fn stop_wallpaper(&mut self) -> bool {
            self.teardown();
            info!("Wallpaper stopped");
            true
        }

        fn teardown(&mut self) {
            hook::uninstall();
            self.session.stop();
            if let Some(mut surface) = self.surface.take() {
                surface.destroy();
            }
            self.state = EngineState::Stopped;
        }

        /// Point the live session at a new address. Runs due maintenance
        /// first so a long-lived wallpaper gets its periodic cache refresh.
        pub fn navigate_to_url(&mut self, url: &str) -> bool {
            self.run_maintenance();
            match self.session.navigate(url) {
                Ok(()) => true,
                Err(e) => {
                    error!("Navigation failed: {}", e);
                    false
                }
            }
        }

        fn run_maintenance(&mut self) {
            self.run_maintenance_at(Instant::now());
        }

        fn run_maintenance_at(&mut self, now: Instant) {
            // Active-session check comes first: `due` consumes the tick, and
            // a tick consumed while stopped would skip the next real reload.
            if self.session.is_active() && self.maintenance.due(now) {
                info!("Periodic maintenance: reloading hosted content");
                self.session.reload();
            }
        }

        /// Full process-exit cleanup: hook, session, surface, any straggler
        /// windows the tracker still knows about, and the cached environment.
        pub fn shutdown(&mut self) {
            self.teardown();
            hook::shutdown();
            resource_tracker::global().cleanup_all();
            crate::session::SharedEnvironment::reset();
            info!("Engine shut down");
        }
    }

    impl Drop for WallpaperEngine {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_stop_without_start_is_idempotent() {
            let mut engine = WallpaperEngine::new(EngineConfig::default());
            let tracked_before = resource_tracker::global().tracked_count();

            assert!(engine.stop_wallpaper());
            assert!(engine.stop_wallpaper());

            assert_eq!(engine.state(), EngineState::Stopped);
            assert_eq!(
                resource_tracker::global().tracked_count(),
                tracked_before
            );
        }

        #[test]
        fn test_maintenance_tick_survives_stopped_period() {
            let mut engine = WallpaperEngine::new(EngineConfig::default());
            let start = Instant::now();
            engine.maintenance = MaintenanceClock {
                interval: Duration::from_secs(60),
                last_run: start,
            };

            // No active session: the overdue tick must not be consumed.
            let later = start + Duration::from_secs(120);
            engine.run_maintenance_at(later);
            assert!(engine.maintenance.due(later));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_stops_on_first_success() {
        let mut calls = 0;
        let ok = run_with_retry(5, Duration::ZERO, || {
            calls += 1;
            calls == 2
        });
        assert!(ok);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_exhausts_attempts() {
        let mut calls = 0;
        let ok = run_with_retry(3, Duration::ZERO, || {
            calls += 1;
            false
        });
        assert!(!ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_runs_at_least_once() {
        let mut calls = 0;
        assert!(run_with_retry(0, Duration::ZERO, || {
            calls += 1;
            true
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_maintenance_clock_fires_once_per_interval() {
        let mut clock = MaintenanceClock::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(!clock.due(start));
        assert!(!clock.due(start + Duration::from_secs(59)));
        assert!(clock.due(start + Duration::from_secs(61)));
        // Marked as run; not due again until another full interval passes.
        assert!(!clock.due(start + Duration::from_secs(90)));
        assert!(clock.due(start + Duration::from_secs(125)));
    }
}
