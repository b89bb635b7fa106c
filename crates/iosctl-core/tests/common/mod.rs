//! Shared test helpers for iosctl-core integration tests.
//!
//! [`FakeToolchain`] stands in for the external tools. It answers the command
//! lines that the backends generate, keeps a little device state (installed
//! apps), and records every invocation so tests can assert on what ran.

#![allow(dead_code)]

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use iosctl_core::adapter::ToolAdapter;
use iosctl_core::config::IosctlConfig;
use iosctl_core::device::IosDevice;
use iosctl_core::runner::{CommandOutput, CommandRunner, RunError};

pub const UDID: &str = "00008110-001A0C123456789A";

/// Which tool chains are "installed".
#[derive(Debug, Clone, Copy)]
pub struct Installed {
    pub pymobiledevice3: bool,
    pub tidevice: bool,
    pub libimobiledevice: bool,
}

impl Installed {
    pub fn all() -> Self {
        Self { pymobiledevice3: true, tidevice: true, libimobiledevice: true }
    }
}

/// Scripted stand-in for pymobiledevice3, tidevice and libimobiledevice.
pub struct FakeToolchain {
    pub installed: Installed,
    pub udids: Vec<String>,
    pub hierarchy: String,
    pub product_type: String,
    pub apps: Mutex<Vec<(String, String)>>,
    pub calls: Mutex<Vec<Vec<String>>>,
    /// When set, every pymobiledevice3 invocation fails with this stderr.
    pub python_failure: Option<String>,
    /// When set, `idevice_id -l` exits 1 with this stderr.
    pub enumeration_failure: Option<String>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            installed: Installed::all(),
            udids: vec![UDID.to_string()],
            hierarchy: "[]".to_string(),
            product_type: "iPhone15,4".to_string(),
            apps: Mutex::new(vec![("com.apple.Preferences".to_string(), "Settings".to_string())]),
            calls: Mutex::new(Vec::new()),
            python_failure: None,
            enumeration_failure: None,
        }
    }

    pub fn with_udids(mut self, udids: &[&str]) -> Self {
        self.udids = udids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_hierarchy(mut self, json: serde_json::Value) -> Self {
        self.hierarchy = json.to_string();
        self
    }

    pub fn with_installed(mut self, installed: Installed) -> Self {
        self.installed = installed;
        self
    }

    pub fn with_enumeration_failure(mut self, stderr: &str) -> Self {
        self.enumeration_failure = Some(stderr.to_string());
        self
    }

    pub fn with_python_failure(mut self, stderr: &str) -> Self {
        self.python_failure = Some(stderr.to_string());
        self
    }

    /// Programs invoked so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c[0].clone()).collect()
    }

    /// Full command lines invoked so far, space-joined.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.join(" ")).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn python(&self, args: &[String]) -> Result<CommandOutput, RunError> {
        if !self.installed.pymobiledevice3 {
            return Ok(CommandOutput::failed(1, "/usr/bin/python3: No module named pymobiledevice3"));
        }
        if let Some(stderr) = &self.python_failure {
            return Ok(CommandOutput::failed(1, stderr.clone()));
        }
        // -m pymobiledevice3 developer dvt <verb> ...
        match args.get(4).map(String::as_str) {
            Some("ui") => Ok(CommandOutput::ok(self.hierarchy.clone())),
            Some(_) => Ok(CommandOutput::ok("")),
            None => Ok(CommandOutput::failed(2, "usage: pymobiledevice3")),
        }
    }

    fn tidevice(&self, args: &[String]) -> Result<CommandOutput, RunError> {
        if !self.installed.tidevice {
            return Err(RunError::NotFound("tidevice".to_string()));
        }
        // --udid <udid> <verb> ...
        match args.get(2).map(String::as_str) {
            Some("dump-hierarchy") => Ok(CommandOutput::ok(self.hierarchy.clone())),
            Some(_) => Ok(CommandOutput::ok("")),
            None => Ok(CommandOutput::failed(2, "usage: tidevice")),
        }
    }

    fn libimobiledevice(&self, program: &str, args: &[String]) -> Result<CommandOutput, RunError> {
        if !self.installed.libimobiledevice {
            return Err(RunError::NotFound(program.to_string()));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match (program, args.as_slice()) {
            ("idevice_id", ["-l"]) if self.enumeration_failure.is_some() => Ok(CommandOutput::failed(
                1,
                self.enumeration_failure.clone().unwrap_or_default(),
            )),
            ("idevice_id", ["-l"]) => Ok(CommandOutput::ok(
                self.udids.iter().map(|u| format!("{}\n", u)).collect::<String>(),
            )),
            ("ideviceinfo", ["-u", _, "-k", "DeviceName"]) => Ok(CommandOutput::ok("Test iPhone\n")),
            ("ideviceinfo", ["-u", _, "-k", "ProductVersion"]) => Ok(CommandOutput::ok("17.0\n")),
            ("ideviceinfo", ["-u", _]) => Ok(CommandOutput::ok(format!(
                "DeviceName: Test iPhone\nProductType: {}\nProductVersion: 17.0\n",
                self.product_type
            ))),
            ("ideviceinstaller", ["-u", _, "-l"]) => {
                let mut out =
                    "CFBundleIdentifier, CFBundleShortVersionString, CFBundleDisplayName\n".to_string();
                for (id, name) in self.apps.lock().unwrap().iter() {
                    out.push_str(&format!("{}, \"1.0\", \"{}\"\n", id, name));
                }
                Ok(CommandOutput::ok(out))
            }
            ("ideviceinstaller", ["-u", _, "-i", path]) => {
                let stem = Path::new(path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("app")
                    .to_string();
                self.apps
                    .lock()
                    .unwrap()
                    .push((format!("com.example.{}", stem.to_lowercase()), stem));
                Ok(CommandOutput::ok("Install: Complete\n"))
            }
            ("ideviceinstaller", ["-u", _, "-U", bundle_id]) => {
                self.apps.lock().unwrap().retain(|(id, _)| id != bundle_id);
                Ok(CommandOutput::ok("Uninstall: Complete\n"))
            }
            ("idevicescreenshot", ["-u", _, path]) => {
                std::fs::write(path, b"\x89PNG").map_err(RunError::Io)?;
                Ok(CommandOutput::ok(format!("Screenshot saved to {}\n", path)))
            }
            ("idevicediagnostics", ["-u", _, "restart"]) => Ok(CommandOutput::ok("Restarting device.\n")),
            _ => Ok(CommandOutput::failed(1, format!("unexpected invocation: {} {:?}", program, args))),
        }
    }
}

impl CommandRunner for FakeToolchain {
    fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<CommandOutput, RunError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        match program {
            "python3" => self.python(args),
            "tidevice" => self.tidevice(args),
            _ => self.libimobiledevice(program, args),
        }
    }
}

/// An adapter that routes every invocation to `fake`.
pub fn adapter(fake: &Arc<FakeToolchain>) -> ToolAdapter {
    ToolAdapter::from_config(&IosctlConfig::default()).with_runner(fake.clone())
}

/// A device handle backed by `fake`, polling every 10ms.
pub fn device(fake: &Arc<FakeToolchain>, udid: Option<&str>) -> IosDevice {
    IosDevice::with_adapter(udid.map(String::from), adapter(fake))
        .with_poll_interval(Duration::from_millis(10))
}

/// A device handle backed by `fake`, already connected.
pub fn connected(fake: &Arc<FakeToolchain>) -> IosDevice {
    let mut device = device(fake, None);
    device.connect().unwrap();
    device
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Counts events whose message equals `message`.
struct MessageCounter {
    message: &'static str,
    count: Arc<AtomicUsize>,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for MessageCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        if visitor.0 == self.message {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` and return how many times `IosDevice::disconnect` ran during it.
pub fn count_disconnects<F: FnOnce()>(f: F) -> usize {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(MessageCounter {
        message: "disconnect",
        count: count.clone(),
    });
    tracing::subscriber::with_default(subscriber, f);
    count.load(Ordering::SeqCst)
}
