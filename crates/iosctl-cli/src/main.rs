//! Command-line control of physical iOS devices.
//!
//! Every device command connects to the target device, runs one operation,
//! and disconnects again.
//!
//! # Usage
//!
//! ```bash
//! # List attached devices
//! iosctl devices
//!
//! # Target a specific device (or set IOSCTL_UDID)
//! iosctl --udid 00008110-001A0C123456789A info
//!
//! # Tap by coordinates or by label
//! iosctl tap 100 200
//! iosctl tap-text "Settings" --exact
//!
//! # Gestures
//! iosctl swipe 200 600 200 200 --duration 0.3
//! iosctl longpress 100 200 --duration 2
//! iosctl back
//!
//! # Wait up to 15 seconds for a label to appear
//! iosctl wait-text "Welcome" --timeout 15
//!
//! # Machine-readable output
//! iosctl --format json apps
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use iosctl_core::automation::UiAutomation;
use iosctl_core::config::{config_path, IosctlConfig};
use iosctl_core::device::IosDevice;
use iosctl_core::{IosError, ToolAdapter};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command-line control of physical iOS devices.
#[derive(Parser)]
#[command(name = "iosctl")]
#[command(about = "Control physical iOS devices over USB")]
#[command(version)]
struct Cli {
    /// UDID of the target device (defaults to the first attached device)
    #[arg(short, long, global = true, env = "IOSCTL_UDID")]
    udid: Option<String>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Per-command timeout for external tools, in seconds
    #[arg(long, global = true, env = "IOSCTL_TIMEOUT")]
    command_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List attached devices
    Devices,

    /// Show device information
    Info,

    /// Save a screenshot
    Screenshot {
        /// Output file
        #[arg(short, long, default_value = "screenshot.png")]
        output: PathBuf,
    },

    /// List installed apps
    Apps,

    /// Install an .ipa archive or .app bundle
    Install {
        /// Path to the package
        path: PathBuf,
    },

    /// Uninstall an app
    Uninstall {
        /// Bundle identifier
        bundle_id: String,
    },

    /// Reboot the device
    Reboot,

    /// Tap at screen coordinates
    Tap {
        /// X coordinate
        #[arg(allow_negative_numbers = true)]
        x: i32,
        /// Y coordinate
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },

    /// Tap an element by its text
    TapText {
        /// Text to look for
        text: String,
        /// Require an exact label match
        #[arg(long)]
        exact: bool,
    },

    /// Swipe between two points
    Swipe {
        #[arg(allow_negative_numbers = true)]
        x1: i32,
        #[arg(allow_negative_numbers = true)]
        y1: i32,
        #[arg(allow_negative_numbers = true)]
        x2: i32,
        #[arg(allow_negative_numbers = true)]
        y2: i32,
        /// Duration in seconds
        #[arg(short, long, default_value = "0.5")]
        duration: f64,
    },

    /// Type text into the focused field
    Input {
        /// Text to type
        text: String,
    },

    /// Press the home button
    Home,

    /// Perform the back gesture
    Back,

    /// Long press at screen coordinates
    Longpress {
        /// X coordinate
        #[arg(allow_negative_numbers = true)]
        x: i32,
        /// Y coordinate
        #[arg(allow_negative_numbers = true)]
        y: i32,
        /// Hold time in seconds
        #[arg(short, long, default_value = "1.0")]
        duration: f64,
    },

    /// Wait for an element with the given text to appear
    WaitText {
        /// Text to look for
        text: String,
        /// Require an exact label match
        #[arg(long)]
        exact: bool,
        /// Seconds to wait before giving up
        #[arg(short, long, default_value = "10")]
        timeout: f64,
    },

    /// Print the logical screen size in points
    ScreenSize,

    /// Print the current UI hierarchy as JSON
    Tree,

    /// Show the effective configuration
    Config {
        /// Write the effective settings to ~/.iosctl/config.json
        #[arg(long)]
        save: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    Device(IosError),
    WaitTimedOut(String),
    Output(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Device(
                IosError::DeviceNotFound(_) | IosError::Connection(_) | IosError::Authentication(_),
            ) => ExitCode::from(2),
            CliError::Device(IosError::UnsupportedOperation(_)) => ExitCode::from(3),
            CliError::Device(_) | CliError::WaitTimedOut(_) | CliError::Output(_) => ExitCode::from(1),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Device(e) => write!(f, "{}", e),
            CliError::WaitTimedOut(text) => write!(f, "Timed out waiting for element with text '{}'", text),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl From<IosError> for CliError {
    fn from(e: IosError) -> Self {
        CliError::Device(e)
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Print `message` in text mode, or `{"success": true, ..extra}` in JSON mode.
fn report(format: OutputFormat, message: String, extra: serde_json::Value) -> Result<(), CliError> {
    match format {
        OutputFormat::Text => {
            println!("{}", message);
            Ok(())
        }
        OutputFormat::Json => {
            let mut value = serde_json::json!({ "success": true });
            if let (Some(obj), serde_json::Value::Object(more)) = (value.as_object_mut(), extra) {
                obj.extend(more);
            }
            print_json(&value)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = IosctlConfig::load();
    if let Some(secs) = cli.command_timeout {
        config.command_timeout_secs = secs;
    }
    debug!(?config, "loaded configuration");

    match &cli.command {
        Command::Devices => list_devices(&ToolAdapter::from_config(&config), cli.format),
        Command::Config { save } => show_config(&config, *save, cli.format),
        command => {
            let mut device = IosDevice::from_config(cli.udid.clone(), &config);
            let session = device.session()?;
            execute(&session, command, &config, cli.format)
        }
    }
}

fn show_config(config: &IosctlConfig, save: bool, format: OutputFormat) -> Result<(), CliError> {
    if save {
        config.save().map_err(IosError::Io)?;
    }
    let path = config_path();
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "path": path, "saved": save, "config": config }));
    }
    print_json(&serde_json::json!(config))?;
    if save {
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn list_devices(adapter: &ToolAdapter, format: OutputFormat) -> Result<(), CliError> {
    let devices = IosDevice::list_devices(adapter)?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "devices": devices }));
    }

    if devices.is_empty() {
        println!("No iOS devices found.");
        return Ok(());
    }
    println!("Found {} device(s):", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {}", i + 1, device.name);
        println!("     UDID: {}", device.udid);
        println!("     iOS Version: {}", device.ios_version);
    }
    Ok(())
}

fn execute(
    device: &IosDevice,
    command: &Command,
    config: &IosctlConfig,
    format: OutputFormat,
) -> Result<(), CliError> {
    use serde_json::json;

    match command {
        Command::Devices => list_devices(device.adapter(), format),
        Command::Config { save } => show_config(config, *save, format),

        Command::Tree => {
            let tree = device.dump_tree()?;
            print_json(&json!(tree))
        }

        Command::Info => {
            let info = device.get_device_info()?;
            if format == OutputFormat::Json {
                return print_json(&json!(info));
            }
            println!("Device Information:");
            println!("{}", "-".repeat(30));
            for (key, value) in &info {
                println!("{}: {}", key, value);
            }
            Ok(())
        }

        Command::Screenshot { output } => {
            let path = device.screenshot(output)?;
            report(
                format,
                format!("Screenshot saved to: {}", path.display()),
                json!({ "path": path }),
            )
        }

        Command::Apps => {
            let apps = device.list_apps()?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "apps": apps }));
            }
            println!("Found {} installed apps:", apps.len());
            for app in &apps {
                println!("  • {} ({})", app.name, app.bundle_id);
            }
            Ok(())
        }

        Command::Install { path } => {
            device.install_app(path)?;
            report(format, format!("Installed {}", path.display()), json!({ "path": path }))
        }

        Command::Uninstall { bundle_id } => {
            device.uninstall_app(bundle_id)?;
            report(format, format!("Uninstalled {}", bundle_id), json!({ "bundle_id": bundle_id }))
        }

        Command::Reboot => {
            device.reboot()?;
            report(format, "Reboot requested".to_string(), json!({}))
        }

        Command::Tap { x, y } => {
            device.tap(*x, *y)?;
            report(format, format!("Tapped at ({}, {})", x, y), json!({ "x": x, "y": y }))
        }

        Command::TapText { text, exact } => {
            device.tap_by_text(text, *exact)?;
            let match_type = if *exact { "exact" } else { "partial" };
            report(
                format,
                format!("Tapped element with text '{}' ({} match)", text, match_type),
                json!({ "text": text, "exact": exact }),
            )
        }

        Command::Swipe { x1, y1, x2, y2, duration } => {
            device.swipe(*x1, *y1, *x2, *y2, *duration)?;
            report(
                format,
                format!("Swiped from ({}, {}) to ({}, {}) in {}s", x1, y1, x2, y2, duration),
                json!({ "from": [x1, y1], "to": [x2, y2], "duration": duration }),
            )
        }

        Command::Input { text } => {
            device.input_text(text)?;
            report(format, format!("Input text: {}", text), json!({ "text": text }))
        }

        Command::Home => {
            device.home_button()?;
            report(format, "Pressed home button".to_string(), json!({}))
        }

        Command::Back => {
            device.back_button()?;
            report(format, "Performed back gesture".to_string(), json!({}))
        }

        Command::Longpress { x, y, duration } => {
            device.long_press(*x, *y, Some(*duration))?;
            report(
                format,
                format!("Long pressed at ({}, {}) for {}s", x, y, duration),
                json!({ "x": x, "y": y, "duration": duration }),
            )
        }

        Command::WaitText { text, exact, timeout } => {
            if !device.wait_for_element_by_text(text, *timeout, *exact)? {
                return Err(CliError::WaitTimedOut(text.clone()));
            }
            report(format, format!("Found element with text '{}'", text), json!({ "text": text }))
        }

        Command::ScreenSize => {
            let (width, height) = device.get_screen_size()?;
            report(
                format,
                format!("{}x{}", width, height),
                json!({ "width": width, "height": height }),
            )
        }
    }
}
