#![deny(unused_must_use)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use args::TopLevelCmd;
use errors::AppError;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::fs::create_dir;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::heart_rate::btle::BtleTransport;
use crate::heart_rate::dummy::DummyTransport;
use crate::heart_rate::transport::Transport;
use crate::settings::Settings;
use event::{Event, EventHandler};
use handler::handle_key_events;

use tui::Tui;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing::{error, info};
use tracing_subscriber::{filter, prelude::*};
use tracing_subscriber::{fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(any(debug_assertions, feature = "portable")))]
use directories::BaseDirs;

pub mod args;
pub mod chart;
pub mod errors;
pub mod heart_rate;
pub mod settings;
pub mod sinks;

mod app;
mod macros;
mod panic_handler;
mod scan;
mod utils;
mod widgets;

mod event;
mod handler;
mod tui;
mod ui;

/// Application result type.
pub type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

pub async fn run_tui(mut arg_config: TopLevelCmd) -> AppResult<()> {
    let working_directory = determine_working_directory().ok_or(AppError::WorkDir)?;
    // Relative overrides are relative to where we were launched, not the working directory
    arg_config.config_override = arg_config
        .config_override
        .map(|p| absolute_path(&p))
        .transpose()?;
    if !working_directory.exists() {
        create_dir(&working_directory)
            .await
            .map_err(|e| AppError::CreateDir {
                path: working_directory.clone(),
                source: e,
            })?;
    }
    std::env::set_current_dir(&working_directory)?;
    let log_name = std::env::current_exe()?
        .with_extension("log")
        .file_name()
        .ok_or_else(|| AppError::Logging("Couldn't build log path".into()))?
        .to_owned();
    let file_appender = BasicRollingFileAppender::new(
        log_name,
        RollingConditionBasic::new().max_size(1024 * 1024 * 5),
        2,
    )?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let time_fmt = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_owned());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_file(false)
        .with_ansi(false)
        .with_target(true)
        .with_timer(time_fmt)
        .with_line_number(true)
        .with_filter(filter::LevelFilter::DEBUG);
    let (fmt_layer, reload_handle) = tracing_subscriber::reload::Layer::new(fmt_layer);
    // btleplug is very chatty at trace
    let env_filter = tracing_subscriber::EnvFilter::new("trace,btleplug=info");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    info!("Starting app... v{}", env!("CARGO_PKG_VERSION"));

    let (settings, config_path) = load_config(&arg_config)?;
    info!("Loaded config from: {}", config_path.display());

    // Starting off at DEBUG, and setting to whatever user has defined
    reload_handle.modify(|layer| *layer.filter_mut() = settings.get_log_level())?;

    if arg_config.use_dummy() {
        let transport = Arc::new(DummyTransport::new(settings.dummy.clone()));
        let app = App::build(&arg_config, settings, config_path, transport, None);
        run_app(app).await
    } else {
        let transport = Arc::new(BtleTransport::new().await?);
        let app = App::build(&arg_config, settings, config_path, transport, None);
        run_app(app).await
    }
}

async fn run_app<T: Transport>(mut app: App<T>) -> AppResult<()> {
    // Initialize the terminal user interface.
    let backend = CrosstermBackend::new(io::stdout());
    let terminal = Terminal::new(backend)?;
    let events = EventHandler::new(100);
    let mut tui = Tui::new(terminal, events);
    tui.init()?;

    app.init().await;

    // Start the main loop.
    while !app.cancel_app.is_cancelled() {
        // Render the user interface.
        tui.draw(&mut app)?;
        tokio::select! {
            // Handle Crossterm events.
            val = tui.events.next() => {
                match val? {
                    Event::Tick => app.term_tick(),
                    Event::Key(key_event) => handle_key_events(&mut app, key_event)?,
                    Event::Resize => tui.autoresize()?,
                }
            }
            // Session, scan and chart updates
            data = app.app_receivers() => app.app_handlers(data).await
        }
    }
    // After while loop closes
    app.join_threads().await;

    info!("Shutting down gracefully...");

    // Reset the terminal.
    tui.exit()?;
    Ok(())
}

pub async fn run_headless(
    arg_config: TopLevelCmd,
    parent_token: CancellationToken,
) -> Result<(), AppError> {
    let (settings, config_path) = load_config(&arg_config)?;

    // Tests can call this more than once per process
    let _ = tracing_subscriber::fmt()
        .with_max_level(settings.get_log_level())
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_owned()))
        .try_init();

    info!("Loaded config from: {}", config_path.display());
    info!("Starting app... v{}", env!("CARGO_PKG_VERSION"));

    if !arg_config.use_dummy() && !settings.has_saved_device() {
        return Err(AppError::NoSavedDevice);
    }

    if arg_config.use_dummy() {
        let transport = Arc::new(DummyTransport::new(settings.dummy.clone()));
        let app = App::build(&arg_config, settings, config_path, transport, Some(parent_token));
        run_app_headless(app).await
    } else {
        let transport = Arc::new(BtleTransport::new().await?);
        let app = App::build(&arg_config, settings, config_path, transport, Some(parent_token));
        run_app_headless(app).await
    }
}

async fn run_app_headless<T: Transport>(mut app: App<T>) -> Result<(), AppError> {
    app.init().await;

    // Since there's no UI to dismiss errors, they only get logged.
    // The app closes itself once the session ends.
    while !app.cancel_app.is_cancelled() {
        let cancel_app = app.cancel_app.clone();
        tokio::select! {
            _ = cancel_app.cancelled() => break,
            data = app.app_receivers() => app.app_handlers(data).await
        }
        if let Some(popup) = app.error_message.take() {
            error!("{popup:?}");
        }
    }
    info!("Joining...");
    // After while loop closes
    app.join_threads().await;

    info!("Shutting down gracefully...");

    Ok(())
}

/// Loads settings from the override path if given, otherwise from a `.toml` next to the executable.
///
/// Fresh installs get their defaults written out unless `no_save` is set.
fn load_config(arg_config: &TopLevelCmd) -> Result<(Settings, PathBuf), AppError> {
    let config_path = match &arg_config.config_override {
        Some(path) => path.clone(),
        None => {
            let exe_path = std::env::current_exe()?;
            let file_name = exe_path
                .with_extension("toml")
                .file_name()
                .ok_or(AppError::WorkDir)?
                .to_owned();
            PathBuf::from(file_name)
        }
    };
    let settings = Settings::load(&config_path, arg_config.config_required)?;
    if !arg_config.no_save && !config_path.exists() {
        settings.save(&config_path)?;
    }
    Ok((settings, config_path))
}

fn absolute_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.exists() {
        Ok(path.canonicalize()?)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Returns the directory that logs, config, and other files should be placed in by default.
// The rules for how it determines the directory is as follows:
// If the app is built with the portable feature, it will just return it's parent directory.
// If there is a config file present adjacent to the executable, the executable's parent path is returned.
// Otherwise, it will return the `directories` `config_dir` output.
//
// Debug builds are always portable. Release builds can optionally have the "portable" feature enabled.
fn determine_working_directory() -> Option<PathBuf> {
    let portable = is_portable();
    let exe_path = std::env::current_exe().ok()?;
    let exe_parent = exe_path.parent()?.to_path_buf();
    let config_path = exe_path.with_extension("toml");

    if portable || config_path.exists() {
        Some(exe_parent)
    } else {
        get_user_dir()
    }
}

#[cfg(any(debug_assertions, feature = "portable"))]
fn is_portable() -> bool {
    true
}

#[cfg(not(any(debug_assertions, feature = "portable")))]
fn is_portable() -> bool {
    false
}

#[cfg(any(debug_assertions, feature = "portable"))]
fn get_user_dir() -> Option<PathBuf> {
    None
}

#[cfg(not(any(debug_assertions, feature = "portable")))]
fn get_user_dir() -> Option<PathBuf> {
    if let Some(base_dirs) = BaseDirs::new() {
        let mut config_dir = base_dirs.config_dir().to_owned();
        config_dir.push(env!("CARGO_PKG_NAME"));
        Some(config_dir)
    } else {
        None
    }
}
