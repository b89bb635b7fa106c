//! # iosctl-core
//!
//! Core library for controlling physical iOS devices over USB.
//!
//! This crate does not speak any device protocol itself. It drives the
//! established command-line tool chains, picks whichever one is installed and
//! able to perform a given operation, and normalizes their output.
//!
//! ## Modules
//!
//! - [`device`] - Device discovery, connection lifecycle, and app management
//! - [`automation`] - Gestures, text input, and text-based element lookup
//! - [`element`] - UI hierarchy model and normalization of tool output
//! - [`adapter`] - Backend selection with ordered fallback
//! - [`backend`] - The supported tool chains and their command lines
//! - [`runner`] - Process spawning with timeouts
//! - [`config`] - Persistent settings in `~/.iosctl/config.json`
//! - [`error`] - Error kinds shared by all of the above
//!
//! ## External Dependencies
//!
//! At least one of these must be installed for anything useful to happen:
//!
//! - **pymobiledevice3** (`pip install pymobiledevice3`) - gestures, text input, UI hierarchy
//! - **tidevice** (`pip install tidevice`) - gestures and UI hierarchy on older setups
//! - **libimobiledevice** (`brew install libimobiledevice ideviceinstaller`) - enumeration,
//!   device info, apps, screenshots, reboot
//!
//! ## Example
//!
//! ```no_run
//! use iosctl_core::{IosDevice, UiAutomation};
//!
//! let mut device = IosDevice::new(None);
//! device.with_session(|d| {
//!     println!("{} apps installed", d.list_apps()?.len());
//!     d.tap_by_text("Settings", true)
//! })?;
//! # Ok::<(), iosctl_core::IosError>(())
//! ```

pub mod adapter;
pub mod automation;
pub mod backend;
pub mod config;
pub mod device;
pub mod element;
pub mod error;
pub mod runner;

pub use adapter::ToolAdapter;
pub use automation::UiAutomation;
pub use device::{DeviceDescriptor, DeviceSession, IosDevice};
pub use error::{IosError, Result};
