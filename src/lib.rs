//! Webpaper Engine
//!
//! Live-wallpaper engine for Windows: embeds a web rendering surface in the
//! desktop wallpaper layer using WorkerW. This is the same technique used by
//! Wallpaper Engine, Lively, etc. The surface sits behind desktop icons,
//! immune to Win+D, and covers the desktop work area.
//!
//! On top of the embedding the engine provides URL allow/deny policy for all
//! navigations, a JSON message bridge from the hosted page, ad-region
//! tracking with native click-through handling, and global mouse forwarding
//! so content can react to clicks even though the surface itself never takes
//! OS input.
//!
//! Policy, routing, and parsing logic is portable and tested everywhere;
//! everything that touches the OS is compiled for Windows only.

pub mod ad_regions;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod input;
pub mod resource_tracker;
pub mod url_filter;

#[cfg(target_os = "windows")]
pub mod host_surface;
#[cfg(target_os = "windows")]
pub mod session;
#[cfg(target_os = "windows")]
pub mod shell;
#[cfg(target_os = "windows")]
pub mod util;

pub use ad_regions::{AdRegion, AdRegionRegistry};
pub use config::EngineConfig;
pub use error::{CommandError, EngineError};
pub use url_filter::UrlValidator;

#[cfg(target_os = "windows")]
pub use engine::{EngineState, WallpaperEngine};
