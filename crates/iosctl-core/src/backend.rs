//! The external automation tools and what each of them can do.
//!
//! Three backends are consulted in a fixed priority order (see
//! [`Backend::RANKED`]). Each one translates an [`Operation`] into the argv of
//! its command-line tool, or returns `None` when it has no way to perform it.
//! The translation is a single exhaustive `match` per backend, so adding an
//! operation forces every backend to decide whether it supports it.
//!
//! | Backend | Tool | Capability |
//! |---|---|---|
//! | [`Backend::DeviceProtocol`] | `python3 -m pymobiledevice3` | [`Capability::FullAutomation`] |
//! | [`Backend::Legacy`] | `tidevice` | [`Capability::PartialAutomation`] |
//! | [`Backend::SystemTools`] | libimobiledevice (`idevice*`) | [`Capability::DeviceManagement`] |

use std::fmt;
use std::path::PathBuf;

/// How much of the automation surface a backend covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Gestures, text input, and UI hierarchy extraction.
    FullAutomation,
    /// Basic gestures and hierarchy dumps, no long press.
    PartialAutomation,
    /// Enumeration, device info, apps, screenshots, reboot.
    DeviceManagement,
}

/// An external tool chain capable of executing device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The modern device-protocol client (`pymobiledevice3`).
    DeviceProtocol,
    /// The legacy automation tool (`tidevice`).
    Legacy,
    /// The libimobiledevice command-line toolkit.
    SystemTools,
}

/// A device operation, independent of which tool ends up running it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ListDevices,
    DeviceProperty { udid: String, key: String },
    DeviceInfo { udid: String },
    ListApps { udid: String },
    InstallApp { udid: String, path: PathBuf },
    UninstallApp { udid: String, bundle_id: String },
    Screenshot { udid: String, path: PathBuf },
    Reboot { udid: String },
    Tap { udid: String, x: i32, y: i32 },
    Swipe {
        udid: String,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: f64,
    },
    LongPress { udid: String, x: i32, y: i32, duration: f64 },
    InputText { udid: String, text: String },
    Home { udid: String },
    UiHierarchy { udid: String },
}

impl Operation {
    /// Short name used in log lines and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListDevices => "list devices",
            Operation::DeviceProperty { .. } => "device property",
            Operation::DeviceInfo { .. } => "device info",
            Operation::ListApps { .. } => "list apps",
            Operation::InstallApp { .. } => "install app",
            Operation::UninstallApp { .. } => "uninstall app",
            Operation::Screenshot { .. } => "screenshot",
            Operation::Reboot { .. } => "reboot",
            Operation::Tap { .. } => "tap",
            Operation::Swipe { .. } => "swipe",
            Operation::LongPress { .. } => "long press",
            Operation::InputText { .. } => "input text",
            Operation::Home { .. } => "home button",
            Operation::UiHierarchy { .. } => "UI hierarchy",
        }
    }
}

/// A resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl Backend {
    /// All backends, highest priority first.
    pub const RANKED: [Backend; 3] = [Backend::DeviceProtocol, Backend::Legacy, Backend::SystemTools];

    pub fn capability(self) -> Capability {
        match self {
            Backend::DeviceProtocol => Capability::FullAutomation,
            Backend::Legacy => Capability::PartialAutomation,
            Backend::SystemTools => Capability::DeviceManagement,
        }
    }

    /// Human-readable tool name.
    pub fn tool_name(self) -> &'static str {
        match self {
            Backend::DeviceProtocol => "pymobiledevice3",
            Backend::Legacy => "tidevice",
            Backend::SystemTools => "libimobiledevice",
        }
    }

    /// Build the invocation for `op`, or `None` if this backend cannot run it.
    ///
    /// `python` is the interpreter used to launch `pymobiledevice3`.
    pub fn invocation(self, op: &Operation, python: &str) -> Option<Invocation> {
        match self {
            Backend::DeviceProtocol => device_protocol_invocation(op, python),
            Backend::Legacy => legacy_invocation(op),
            Backend::SystemTools => system_invocation(op),
        }
    }

    /// Whether this backend can run `op` at all.
    pub fn supports(self, op: &Operation) -> bool {
        self.invocation(op, "python3").is_some()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

fn dvt<I, S>(python: &str, args: I) -> Invocation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv: Vec<String> = ["-m", "pymobiledevice3", "developer", "dvt"]
        .into_iter()
        .map(String::from)
        .collect();
    argv.extend(args.into_iter().map(Into::into));
    Invocation::new(python, argv)
}

fn device_protocol_invocation(op: &Operation, python: &str) -> Option<Invocation> {
    let inv = match op {
        Operation::Tap { udid, x, y } => {
            dvt(python, ["tap".to_string(), "--udid".into(), udid.clone(), x.to_string(), y.to_string()])
        }
        Operation::Swipe { udid, start_x, start_y, end_x, end_y, duration } => dvt(
            python,
            [
                "swipe".to_string(),
                "--udid".into(),
                udid.clone(),
                start_x.to_string(),
                start_y.to_string(),
                end_x.to_string(),
                end_y.to_string(),
                "--duration".into(),
                duration.to_string(),
            ],
        ),
        Operation::LongPress { udid, x, y, duration } => dvt(
            python,
            [
                "longpress".to_string(),
                "--udid".into(),
                udid.clone(),
                x.to_string(),
                y.to_string(),
                "--duration".into(),
                duration.to_string(),
            ],
        ),
        Operation::InputText { udid, text } => {
            dvt(python, ["input".to_string(), "--udid".into(), udid.clone(), text.clone()])
        }
        Operation::Home { udid } => dvt(python, ["home".to_string(), "--udid".into(), udid.clone()]),
        Operation::UiHierarchy { udid } => dvt(
            python,
            ["ui".to_string(), "--udid".into(), udid.clone(), "--format".into(), "json".into()],
        ),
        Operation::ListDevices
        | Operation::DeviceProperty { .. }
        | Operation::DeviceInfo { .. }
        | Operation::ListApps { .. }
        | Operation::InstallApp { .. }
        | Operation::UninstallApp { .. }
        | Operation::Screenshot { .. }
        | Operation::Reboot { .. } => return None,
    };
    Some(inv)
}

fn legacy_invocation(op: &Operation) -> Option<Invocation> {
    let inv = match op {
        Operation::Tap { udid, x, y } => Invocation::new(
            "tidevice",
            ["--udid".to_string(), udid.clone(), "tap".into(), x.to_string(), y.to_string()],
        ),
        // tidevice has no duration argument for swipes.
        Operation::Swipe { udid, start_x, start_y, end_x, end_y, .. } => Invocation::new(
            "tidevice",
            [
                "--udid".to_string(),
                udid.clone(),
                "swipe".into(),
                start_x.to_string(),
                start_y.to_string(),
                end_x.to_string(),
                end_y.to_string(),
            ],
        ),
        Operation::InputText { udid, text } => Invocation::new(
            "tidevice",
            ["--udid".to_string(), udid.clone(), "input".into(), text.clone()],
        ),
        Operation::Home { udid } => {
            Invocation::new("tidevice", ["--udid".to_string(), udid.clone(), "home".into()])
        }
        Operation::UiHierarchy { udid } => Invocation::new(
            "tidevice",
            ["--udid".to_string(), udid.clone(), "dump-hierarchy".into()],
        ),
        Operation::LongPress { .. }
        | Operation::ListDevices
        | Operation::DeviceProperty { .. }
        | Operation::DeviceInfo { .. }
        | Operation::ListApps { .. }
        | Operation::InstallApp { .. }
        | Operation::UninstallApp { .. }
        | Operation::Screenshot { .. }
        | Operation::Reboot { .. } => return None,
    };
    Some(inv)
}

fn system_invocation(op: &Operation) -> Option<Invocation> {
    let inv = match op {
        Operation::ListDevices => Invocation::new("idevice_id", ["-l"]),
        Operation::DeviceProperty { udid, key } => Invocation::new(
            "ideviceinfo",
            ["-u".to_string(), udid.clone(), "-k".into(), key.clone()],
        ),
        Operation::DeviceInfo { udid } => {
            Invocation::new("ideviceinfo", ["-u".to_string(), udid.clone()])
        }
        Operation::ListApps { udid } => {
            Invocation::new("ideviceinstaller", ["-u".to_string(), udid.clone(), "-l".into()])
        }
        Operation::InstallApp { udid, path } => Invocation::new(
            "ideviceinstaller",
            ["-u".to_string(), udid.clone(), "-i".into(), path.display().to_string()],
        ),
        Operation::UninstallApp { udid, bundle_id } => Invocation::new(
            "ideviceinstaller",
            ["-u".to_string(), udid.clone(), "-U".into(), bundle_id.clone()],
        ),
        Operation::Screenshot { udid, path } => Invocation::new(
            "idevicescreenshot",
            ["-u".to_string(), udid.clone(), path.display().to_string()],
        ),
        Operation::Reboot { udid } => Invocation::new(
            "idevicediagnostics",
            ["-u".to_string(), udid.clone(), "restart".into()],
        ),
        Operation::Tap { .. }
        | Operation::Swipe { .. }
        | Operation::LongPress { .. }
        | Operation::InputText { .. }
        | Operation::Home { .. }
        | Operation::UiHierarchy { .. } => return None,
    };
    Some(inv)
}
