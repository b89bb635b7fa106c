//! Device handle: discovery, connection lifecycle, and device management.
//!
//! An [`IosDevice`] moves through
//! `Disconnected → Connecting → Connected → Disconnected`. Every operation other
//! than [`IosDevice::list_devices`] requires the `Connected` state.
//!
//! Prefer [`IosDevice::session`] (or [`IosDevice::with_session`]) over calling
//! `connect`/`disconnect` by hand: the returned guard disconnects when it is
//! dropped, including on early returns and panics.
//!
//! # Example
//!
//! ```no_run
//! use iosctl_core::device::IosDevice;
//!
//! let mut device = IosDevice::new(None);
//! let session = device.session()?;
//! for (key, value) in session.get_device_info()? {
//!     println!("{}: {}", key, value);
//! }
//! # Ok::<(), iosctl_core::error::IosError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::ToolAdapter;
use crate::backend::Operation;
use crate::config::IosctlConfig;
use crate::error::{IosError, Result};

const UNKNOWN_NAME: &str = "Unknown Device";
const UNKNOWN_VERSION: &str = "Unknown";

/// Lockdown properties of a device, sorted by key.
pub type DeviceInfo = BTreeMap<String, String>;

/// An attached device as reported during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub udid: String,
    pub name: String,
    pub ios_version: String,
}

/// An installed application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDescriptor {
    pub bundle_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Connection lifecycle of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Handle to one iOS device.
#[derive(Debug)]
pub struct IosDevice {
    udid: Option<String>,
    state: ConnectionState,
    descriptor: Option<DeviceDescriptor>,
    adapter: ToolAdapter,
    poll_interval: Duration,
}

impl IosDevice {
    /// Handle for `udid`, or for the first attached device when `None`.
    ///
    /// Uses the saved configuration (`~/.iosctl/config.json`).
    pub fn new(udid: Option<String>) -> Self {
        Self::from_config(udid, &IosctlConfig::load())
    }

    pub fn from_config(udid: Option<String>, config: &IosctlConfig) -> Self {
        Self {
            udid,
            state: ConnectionState::Disconnected,
            descriptor: None,
            adapter: ToolAdapter::from_config(config),
            poll_interval: config.poll_interval(),
        }
    }

    /// Handle that runs its operations through `adapter`.
    pub fn with_adapter(udid: Option<String>, adapter: ToolAdapter) -> Self {
        let config = IosctlConfig::default();
        Self {
            udid,
            state: ConnectionState::Disconnected,
            descriptor: None,
            adapter,
            poll_interval: config.poll_interval(),
        }
    }

    /// Override the interval between lookups while waiting for elements.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn udid(&self) -> Option<&str> {
        self.udid.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Descriptor captured by the last successful [`connect`](Self::connect).
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn adapter(&self) -> &ToolAdapter {
        &self.adapter
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// List attached devices in enumeration order.
    ///
    /// Returns an empty list when nothing is attached, when the enumeration
    /// tool is missing, or when it fails (`idevice_id` exits non-zero while
    /// usbmuxd is not running). Name and version lookups that fail fall back
    /// to placeholder values instead of dropping the device.
    pub fn list_devices(adapter: &ToolAdapter) -> Result<Vec<DeviceDescriptor>> {
        let output = match adapter.execute(&Operation::ListDevices) {
            Ok(output) => output,
            Err(e) => {
                warn!("cannot enumerate devices: {}", e);
                return Ok(Vec::new());
            }
        };

        let devices = parse_device_ids(&output.stdout)
            .into_iter()
            .map(|udid| {
                let name = query_property(adapter, &udid, "DeviceName")
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string());
                let ios_version = query_property(adapter, &udid, "ProductVersion")
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
                DeviceDescriptor { udid, name, ios_version }
            })
            .collect();
        Ok(devices)
    }

    /// Resolve the target device and enter the `Connected` state.
    ///
    /// # Errors
    ///
    /// [`IosError::DeviceNotFound`] if no device is attached (including when
    /// enumeration fails), or the explicit UDID is not among the attached
    /// devices.
    pub fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;

        let resolved = Self::list_devices(&self.adapter).and_then(|devices| {
            let mut devices = devices.into_iter().peekable();
            if devices.peek().is_none() {
                return Err(IosError::DeviceNotFound("No iOS devices found".to_string()));
            }
            match self.udid.as_deref() {
                Some(udid) => devices.find(|d| d.udid == udid).ok_or_else(|| {
                    IosError::DeviceNotFound(format!("Device with UDID {} not found", udid))
                }),
                None => devices
                    .next()
                    .ok_or_else(|| IosError::DeviceNotFound("No iOS devices found".to_string())),
            }
        });

        match resolved {
            Ok(device) => {
                info!(udid = %device.udid, name = %device.name, "connected");
                self.udid = Some(device.udid.clone());
                self.descriptor = Some(device);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Enter the `Disconnected` state. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        debug!(udid = ?self.udid, was = ?self.state, "disconnect");
        self.state = ConnectionState::Disconnected;
        self.descriptor = None;
    }

    /// Connect and return a guard that disconnects when dropped.
    pub fn session(&mut self) -> Result<DeviceSession<'_>> {
        self.connect()?;
        Ok(DeviceSession { device: self })
    }

    /// Run `f` against a connected device, disconnecting afterwards no
    /// matter how `f` exits.
    pub fn with_session<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut IosDevice) -> Result<T>,
    {
        let mut session = self.session()?;
        f(&mut session)
    }

    /// UDID of the connected device.
    pub(crate) fn connected_udid(&self) -> Result<String> {
        match (&self.state, &self.udid) {
            (ConnectionState::Connected, Some(udid)) => Ok(udid.clone()),
            _ => Err(IosError::not_connected()),
        }
    }

    /// Fetch all lockdown properties. Never cached.
    pub fn get_device_info(&self) -> Result<DeviceInfo> {
        let udid = self.connected_udid()?;
        let output = self.adapter.execute(&Operation::DeviceInfo { udid })?;
        Ok(parse_key_values(&output.stdout))
    }

    pub fn list_apps(&self) -> Result<Vec<AppDescriptor>> {
        let udid = self.connected_udid()?;
        let output = self.adapter.execute(&Operation::ListApps { udid })?;
        Ok(parse_app_list(&output.stdout))
    }

    /// Install an `.ipa` archive or `.app` bundle.
    ///
    /// # Errors
    ///
    /// [`IosError::FileNotFound`] if `path` does not exist or is not an
    /// installable package.
    pub fn install_app(&self, path: impl AsRef<Path>) -> Result<()> {
        let udid = self.connected_udid()?;
        let path = path.as_ref();
        check_package(path)?;
        self.adapter.execute(&Operation::InstallApp {
            udid,
            path: path.to_path_buf(),
        })?;
        info!(path = %path.display(), "installed app");
        Ok(())
    }

    /// Remove an installed app.
    ///
    /// # Errors
    ///
    /// - [`IosError::AppNotFound`] if `bundle_id` is not installed
    pub fn uninstall_app(&self, bundle_id: &str) -> Result<()> {
        let udid = self.connected_udid()?;
        if !self.list_apps()?.iter().any(|app| app.bundle_id == bundle_id) {
            return Err(IosError::AppNotFound(bundle_id.to_string()));
        }
        self.adapter.execute(&Operation::UninstallApp {
            udid,
            bundle_id: bundle_id.to_string(),
        })?;
        info!(bundle_id, "uninstalled app");
        Ok(())
    }

    /// Capture the screen to `output_path` and return the path.
    pub fn screenshot(&self, output_path: impl AsRef<Path>) -> Result<PathBuf> {
        let udid = self.connected_udid()?;
        let path = output_path.as_ref().to_path_buf();
        self.adapter.execute(&Operation::Screenshot {
            udid,
            path: path.clone(),
        })?;
        Ok(path)
    }

    /// Ask the device to restart.
    ///
    /// Returns once the command was accepted; the device drops off the bus
    /// before it can confirm anything.
    pub fn reboot(&self) -> Result<()> {
        let udid = self.connected_udid()?;
        self.adapter.execute(&Operation::Reboot { udid })?;
        Ok(())
    }
}

impl fmt::Display for IosDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.descriptor, &self.udid) {
            (Some(d), _) => write!(f, "IosDevice(udid={}, name={})", d.udid, d.name),
            (None, Some(udid)) => write!(f, "IosDevice(udid={}, state={:?})", udid, self.state),
            (None, None) => write!(f, "IosDevice(udid=<first available>, state={:?})", self.state),
        }
    }
}

/// A connected device that disconnects when dropped.
pub struct DeviceSession<'a> {
    device: &'a mut IosDevice,
}

impl Deref for DeviceSession<'_> {
    type Target = IosDevice;

    fn deref(&self) -> &IosDevice {
        self.device
    }
}

impl DerefMut for DeviceSession<'_> {
    fn deref_mut(&mut self) -> &mut IosDevice {
        self.device
    }
}

impl Drop for DeviceSession<'_> {
    fn drop(&mut self) {
        self.device.disconnect();
    }
}

fn query_property(adapter: &ToolAdapter, udid: &str, key: &str) -> Option<String> {
    let op = Operation::DeviceProperty {
        udid: udid.to_string(),
        key: key.to_string(),
    };
    match adapter.execute(&op) {
        Ok(output) => Some(output.stdout.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            debug!(udid, key, error = %e, "property lookup failed");
            None
        }
    }
}

fn check_package(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let installable = match ext.as_deref() {
        Some("ipa") => path.is_file(),
        Some("app") => path.is_dir(),
        _ => false,
    };
    if installable {
        Ok(())
    } else {
        Err(IosError::FileNotFound(path.to_path_buf()))
    }
}

/// One UDID per non-empty line of `idevice_id -l`.
pub fn parse_device_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// `Key: Value` lines, split on the first colon.
pub fn parse_key_values(stdout: &str) -> DeviceInfo {
    stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parse `ideviceinstaller -l` output.
///
/// Two formats are understood:
///
/// - CSV (current releases): `com.example.app, "1.2", "Example"`, after a
///   `CFBundleIdentifier, ...` header line;
/// - legacy: `com.example.app - Example`.
pub fn parse_app_list(stdout: &str) -> Vec<AppDescriptor> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("CFBundleIdentifier"))
        .filter_map(|line| {
            if line.contains('"') || !line.contains(" - ") {
                parse_csv_app(line)
            } else {
                parse_legacy_app(line)
            }
        })
        .collect()
}

fn parse_csv_app(line: &str) -> Option<AppDescriptor> {
    let fields = split_csv(line);
    match fields.as_slice() {
        [bundle_id, version, name, ..] if !bundle_id.is_empty() => Some(AppDescriptor {
            bundle_id: bundle_id.clone(),
            name: name.clone(),
            version: Some(version.clone()).filter(|v| !v.is_empty()),
        }),
        _ => None,
    }
}

fn parse_legacy_app(line: &str) -> Option<AppDescriptor> {
    let (bundle_id, name) = line.split_once(" - ")?;
    let bundle_id = bundle_id.trim();
    if bundle_id.is_empty() || bundle_id.contains(' ') {
        return None;
    }
    Some(AppDescriptor {
        bundle_id: bundle_id.to_string(),
        name: name.trim().to_string(),
        version: None,
    })
}

/// Split on commas outside double quotes; quotes are stripped.
fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}
