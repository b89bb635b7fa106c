//! Coordinate and text-based UI automation.
//!
//! [`UiAutomation`] splits into a handful of required methods that touch a
//! backend (gestures, text input, hierarchy dumps, screen size) and default
//! methods built on top of them that search the hierarchy locally. [`IosDevice`]
//! implements the required half through the [`ToolAdapter`](crate::adapter::ToolAdapter).
//!
//! ```no_run
//! use iosctl_core::automation::UiAutomation;
//! use iosctl_core::device::IosDevice;
//!
//! let mut device = IosDevice::new(None);
//! device.with_session(|d| {
//!     d.tap_by_text("Settings", false)?;
//!     d.wait_for_element_by_text("General", 5.0, true)
//! })?;
//! # Ok::<(), iosctl_core::error::IosError>(())
//! ```

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::Operation;
use crate::device::IosDevice;
use crate::element::{self, parse_hierarchy, UIElement};
use crate::error::{IosError, Result};

/// Hold time used by [`UiAutomation::long_press`] when none is given.
pub const DEFAULT_LONG_PRESS_SECS: f64 = 1.0;

/// Poll interval used by implementors that do not override it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Screen size assumed for models missing from [`SCREEN_SIZES`].
pub const DEFAULT_SCREEN_SIZE: (u32, u32) = (375, 667);

const BACK_SWIPE_EDGE_X: i32 = 10;
const BACK_SWIPE_SECS: f64 = 0.3;

/// Logical screen sizes in points, keyed by `ProductType`.
pub const SCREEN_SIZES: [(&str, (u32, u32)); 10] = [
    ("iPhone16,2", (393, 852)),
    ("iPhone16,1", (393, 852)),
    ("iPhone15,5", (428, 926)),
    ("iPhone15,4", (390, 844)),
    ("iPhone14,3", (428, 926)),
    ("iPhone14,2", (390, 844)),
    ("iPhone13,4", (428, 926)),
    ("iPhone13,3", (390, 844)),
    ("iPad14,6", (1024, 1366)),
    ("iPad13,11", (1024, 1366)),
];

/// Screen size for a `ProductType`, falling back to [`DEFAULT_SCREEN_SIZE`].
pub fn screen_size_for_model(product_type: &str) -> (u32, u32) {
    SCREEN_SIZES
        .iter()
        .find(|(model, _)| *model == product_type)
        .map(|(_, size)| *size)
        .unwrap_or(DEFAULT_SCREEN_SIZE)
}

/// UI automation against a connected device.
///
/// # Required Methods
///
/// Implementors provide [`tap`](UiAutomation::tap),
/// [`swipe`](UiAutomation::swipe), [`long_press`](UiAutomation::long_press),
/// [`input_text`](UiAutomation::input_text),
/// [`home_button`](UiAutomation::home_button),
/// [`dump_tree`](UiAutomation::dump_tree) and
/// [`get_screen_size`](UiAutomation::get_screen_size).
///
/// # Default Methods
///
/// Text lookup, text taps, the back gesture, and waiting are built on the
/// required methods. Matching is exact equality when `exact` is set, otherwise
/// a case-insensitive substring test; the first match in preorder wins and
/// elements without a frame are never selected.
pub trait UiAutomation {
    /// Tap at screen coordinates, in points.
    fn tap(&self, x: i32, y: i32) -> Result<()>;

    /// Swipe between two points over `duration` seconds.
    fn swipe(&self, start_x: i32, start_y: i32, end_x: i32, end_y: i32, duration: f64) -> Result<()>;

    /// Press and hold. `None` holds for [`DEFAULT_LONG_PRESS_SECS`].
    fn long_press(&self, x: i32, y: i32, duration: Option<f64>) -> Result<()>;

    /// Type into whichever element currently has focus.
    fn input_text(&self, text: &str) -> Result<()>;

    fn home_button(&self) -> Result<()>;

    /// Fetch and normalize the current UI hierarchy.
    fn dump_tree(&self) -> Result<Vec<UIElement>>;

    /// Logical screen size in points, `(width, height)`.
    fn get_screen_size(&self) -> Result<(u32, u32)>;

    /// Sleep between lookups in [`wait_for_element_by_text`](UiAutomation::wait_for_element_by_text).
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Fails when the target cannot take commands at all.
    ///
    /// Checked once before polling, so a wait on an unusable target errors
    /// instead of timing out.
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// First element in the current hierarchy whose label matches `text`.
    fn find_by_text(&self, text: &str, exact: bool) -> Result<Option<UIElement>> {
        let tree = self.dump_tree()?;
        Ok(element::find_by_text(&tree, text, exact).cloned())
    }

    /// Tap the center of the first element matching `text`.
    ///
    /// # Errors
    ///
    /// [`IosError::ElementNotFound`] if no element with a frame matches.
    fn tap_by_text(&self, text: &str, exact: bool) -> Result<()> {
        let (x, y) = self
            .find_by_text(text, exact)?
            .and_then(|el| el.frame)
            .map(|frame| frame.center())
            .ok_or_else(|| IosError::ElementNotFound(text.to_string()))?;
        debug!(text, x, y, "tapping element");
        self.tap(x, y)
    }

    /// Edge swipe from the left side toward the middle of the screen.
    ///
    /// This approximates the navigation back gesture; screens without an
    /// interactive pop ignore it.
    fn back_button(&self) -> Result<()> {
        let (width, height) = self.get_screen_size()?;
        let mid_y = (height / 2) as i32;
        self.swipe(BACK_SWIPE_EDGE_X, mid_y, (width / 2) as i32, mid_y, BACK_SWIPE_SECS)
    }

    /// Poll until an element matching `text` appears or `timeout` seconds pass.
    ///
    /// Lookup errors count as "not found yet". A zero timeout returns `false`
    /// without looking. The last sleep is cut short at the deadline.
    ///
    /// # Errors
    ///
    /// Whatever [`ensure_ready`](UiAutomation::ensure_ready) reports, before
    /// any lookup.
    fn wait_for_element_by_text(&self, text: &str, timeout: f64, exact: bool) -> Result<bool> {
        self.ensure_ready()?;
        let timeout = Duration::try_from_secs_f64(timeout).unwrap_or(Duration::ZERO);
        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.find_by_text(text, exact) {
                Ok(Some(_)) => return Ok(true),
                Ok(None) => {}
                Err(e) => debug!(text, error = %e, "lookup failed while waiting"),
            }
            let remaining = timeout.saturating_sub(start.elapsed());
            thread::sleep(self.poll_interval().min(remaining));
        }
        Ok(false)
    }
}

impl UiAutomation for IosDevice {
    fn tap(&self, x: i32, y: i32) -> Result<()> {
        let udid = self.connected_udid()?;
        self.adapter().execute(&Operation::Tap { udid, x, y })?;
        info!(x, y, "tap");
        Ok(())
    }

    fn swipe(&self, start_x: i32, start_y: i32, end_x: i32, end_y: i32, duration: f64) -> Result<()> {
        let udid = self.connected_udid()?;
        self.adapter().execute(&Operation::Swipe {
            udid,
            start_x,
            start_y,
            end_x,
            end_y,
            duration,
        })?;
        info!(start_x, start_y, end_x, end_y, duration, "swipe");
        Ok(())
    }

    fn long_press(&self, x: i32, y: i32, duration: Option<f64>) -> Result<()> {
        let udid = self.connected_udid()?;
        let duration = duration.unwrap_or(DEFAULT_LONG_PRESS_SECS);
        self.adapter()
            .execute(&Operation::LongPress { udid, x, y, duration })?;
        info!(x, y, duration, "long press");
        Ok(())
    }

    fn input_text(&self, text: &str) -> Result<()> {
        let udid = self.connected_udid()?;
        self.adapter().execute(&Operation::InputText {
            udid,
            text: text.to_string(),
        })?;
        info!(chars = text.chars().count(), "input text");
        Ok(())
    }

    fn home_button(&self) -> Result<()> {
        let udid = self.connected_udid()?;
        self.adapter().execute(&Operation::Home { udid })?;
        Ok(())
    }

    fn dump_tree(&self) -> Result<Vec<UIElement>> {
        let udid = self.connected_udid()?;
        let output = self.adapter().execute(&Operation::UiHierarchy { udid })?;
        parse_hierarchy(&output.stdout)
    }

    fn get_screen_size(&self) -> Result<(u32, u32)> {
        self.connected_udid()?;
        let size = match self.get_device_info() {
            Ok(info) => info
                .get("ProductType")
                .map(|model| screen_size_for_model(model))
                .unwrap_or(DEFAULT_SCREEN_SIZE),
            Err(e) => {
                debug!(error = %e, "device info unavailable, assuming default screen size");
                DEFAULT_SCREEN_SIZE
            }
        };
        Ok(size)
    }

    fn poll_interval(&self) -> Duration {
        IosDevice::poll_interval(self)
    }

    fn ensure_ready(&self) -> Result<()> {
        self.connected_udid().map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementFrame;
    use std::cell::RefCell;

    /// Records gestures and serves a fixed tree.
    #[derive(Default)]
    struct Recorder {
        tree: Vec<UIElement>,
        screen: (u32, u32),
        taps: RefCell<Vec<(i32, i32)>>,
        swipes: RefCell<Vec<(i32, i32, i32, i32, f64)>>,
        dumps: RefCell<usize>,
        poll: Option<Duration>,
        offline: bool,
    }

    impl UiAutomation for Recorder {
        fn tap(&self, x: i32, y: i32) -> Result<()> {
            self.taps.borrow_mut().push((x, y));
            Ok(())
        }

        fn swipe(&self, sx: i32, sy: i32, ex: i32, ey: i32, d: f64) -> Result<()> {
            self.swipes.borrow_mut().push((sx, sy, ex, ey, d));
            Ok(())
        }

        fn long_press(&self, _x: i32, _y: i32, _duration: Option<f64>) -> Result<()> {
            Ok(())
        }

        fn input_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn home_button(&self) -> Result<()> {
            Ok(())
        }

        fn dump_tree(&self) -> Result<Vec<UIElement>> {
            *self.dumps.borrow_mut() += 1;
            Ok(self.tree.clone())
        }

        fn get_screen_size(&self) -> Result<(u32, u32)> {
            Ok(self.screen)
        }

        fn poll_interval(&self) -> Duration {
            self.poll.unwrap_or(Duration::from_millis(10))
        }

        fn ensure_ready(&self) -> Result<()> {
            if self.offline {
                Err(IosError::Connection("Device not connected".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn settings_tree() -> Vec<UIElement> {
        vec![
            UIElement::new("Settings", ElementFrame { x: 0.0, y: 0.0, width: 100.0, height: 40.0 }),
            UIElement::new("Settings App", ElementFrame { x: 0.0, y: 100.0, width: 100.0, height: 40.0 }),
        ]
    }

    #[test]
    fn test_screen_size_table() {
        assert_eq!(screen_size_for_model("iPhone15,4"), (390, 844));
        assert_eq!(screen_size_for_model("iPad13,11"), (1024, 1366));
        assert_eq!(screen_size_for_model("iPhone1,1"), DEFAULT_SCREEN_SIZE);
    }

    #[test]
    fn test_tap_by_text_exact_and_partial() {
        let ui = Recorder { tree: settings_tree(), ..Default::default() };
        ui.tap_by_text("Settings", true).unwrap();
        ui.tap_by_text("settings app", false).unwrap();
        assert_eq!(*ui.taps.borrow(), vec![(50, 20), (50, 120)]);
    }

    #[test]
    fn test_tap_by_text_not_found() {
        let ui = Recorder { tree: settings_tree(), ..Default::default() };
        let err = ui.tap_by_text("Bluetooth", false).unwrap_err();
        assert!(matches!(err, IosError::ElementNotFound(ref t) if t == "Bluetooth"));
        assert!(ui.taps.borrow().is_empty());
    }

    #[test]
    fn test_back_button_uses_screen_size() {
        let ui = Recorder { screen: (390, 844), ..Default::default() };
        ui.back_button().unwrap();
        assert_eq!(*ui.swipes.borrow(), vec![(10, 422, 195, 422, 0.3)]);
    }

    #[test]
    fn test_wait_zero_timeout_never_looks() {
        let ui = Recorder { tree: settings_tree(), ..Default::default() };
        assert!(!ui.wait_for_element_by_text("Settings", 0.0, false).unwrap());
        assert_eq!(*ui.dumps.borrow(), 0);
    }

    #[test]
    fn test_wait_finds_present_element() {
        let ui = Recorder { tree: settings_tree(), ..Default::default() };
        assert!(ui.wait_for_element_by_text("Settings App", 1.0, true).unwrap());
        assert_eq!(*ui.dumps.borrow(), 1);
    }

    #[test]
    fn test_wait_sleep_is_capped_at_deadline() {
        let ui = Recorder {
            tree: settings_tree(),
            poll: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let start = Instant::now();
        assert!(!ui.wait_for_element_by_text("Wi-Fi", 0.05, false).unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_on_unready_target_errors_without_lookup() {
        let ui = Recorder { tree: settings_tree(), offline: true, ..Default::default() };
        let err = ui.wait_for_element_by_text("Settings", 1.0, false).unwrap_err();
        assert!(matches!(err, IosError::Connection(_)));
        assert_eq!(*ui.dumps.borrow(), 0);
    }

    #[test]
    fn test_wait_times_out() {
        let ui = Recorder { tree: settings_tree(), ..Default::default() };
        let start = Instant::now();
        assert!(!ui.wait_for_element_by_text("Wi-Fi", 0.1, false).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(*ui.dumps.borrow() >= 1);
    }
}
