// Prevents additional console window on Windows in release
#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

//! Standalone runner: sets a web page as the live wallpaper and pumps
//! messages until the process is killed.
//!
//! ```text
//! webpaper <url> [--interactive] [--config <path>]
//! ```

use std::path::PathBuf;

struct CliArgs {
    url: String,
    interactive: bool,
    config_path: Option<PathBuf>,
}

fn parse_cli(mut args: std::env::Args) -> Result<CliArgs, String> {
    let _exe = args.next();
    let mut url = None;
    let mut interactive = false;
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--interactive" => interactive = true,
            "--config" => {
                config_path = Some(PathBuf::from(
                    args.next().ok_or("--config requires a path")?,
                ));
            }
            other if url.is_none() && !other.starts_with('-') => {
                url = Some(other.to_string());
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(CliArgs {
        url: url.ok_or("usage: webpaper <url> [--interactive] [--config <path>]")?,
        interactive,
        config_path,
    })
}

fn main() {
    // Keep Chromium rendering and event delivery alive while the surface is
    // occluded behind the desktop icon layer.
    std::env::set_var(
        "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS",
        "--disable-features=CalculateNativeWinOcclusion,CalculateWindowOcclusion --disable-backgrounding-occluded-windows",
    );

    if let Err(e) = webpaper::diagnostics::init(std::path::Path::new("webpaper.log")) {
        eprintln!("logging unavailable: {e}");
    }

    let cli = match parse_cli(std::env::args()) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let config = match &cli.config_path {
        Some(path) => match webpaper::EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config {}: {e}", path.display());
                std::process::exit(2);
            }
        },
        None => webpaper::EngineConfig::default(),
    };

    run(cli, config);
}

#[cfg(target_os = "windows")]
fn run(cli: CliArgs, config: webpaper::EngineConfig) {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, TranslateMessage, MSG,
    };

    unsafe {
        let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
    }

    let mut engine = webpaper::WallpaperEngine::new(config);
    if !engine.initialize_with_retry(&cli.url, !cli.interactive, 3) {
        eprintln!("could not start the wallpaper, see webpaper.log");
        std::process::exit(1);
    }

    // The engine lives on this thread; WebView2 completions and forwarded
    // input both arrive through this pump.
    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).into() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    engine.shutdown();
}

#[cfg(not(target_os = "windows"))]
fn run(_cli: CliArgs, _config: webpaper::EngineConfig) {
    eprintln!("webpaper only runs on Windows; this build exposes the library only");
    std::process::exit(1);
}
