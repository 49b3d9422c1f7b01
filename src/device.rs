//! Platform device handles and enumeration.
//!
//! The arbiter owns exactly one [`DeviceHandle`] at a time. Handles are
//! scoped acquisitions: constructing one claims the platform device,
//! dropping it releases the claim on every exit path. Construction goes
//! through a [`DeviceOpener`] so the platform layer is a runtime seam -
//! the CPAL opener is the default and tests install [`MockOpener`].

use cpal::traits::{DeviceTrait, HostTrait};

use crate::arbiter::DeviceKind;
use crate::AudioOutputError;

/// Substrings that identify a digital-capable output in a device name.
const DIGITAL_NAME_HINTS: [&str; 4] = ["digital", "spdif", "iec958", "hdmi"];

/// An exclusively owned claim on a platform output device.
///
/// Construct-acquires, drop-releases. The arbiter is the only long-term
/// owner; sinks borrow the platform device at construction and must not
/// retain it past their own deinitialization.
pub struct DeviceHandle {
    name: String,
    device: Option<cpal::Device>,
    release_hook: Option<Box<dyn FnMut() + Send>>,
}

impl DeviceHandle {
    /// Wraps a claimed CPAL device.
    pub fn cpal(name: impl Into<String>, device: cpal::Device) -> Self {
        Self {
            name: name.into(),
            device: Some(device),
            release_hook: None,
        }
    }

    /// Creates a handle with no platform device behind it.
    ///
    /// Used by mock openers in tests; backends that need a real stream
    /// report [`AudioOutputError::BackendError`] when they encounter one.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: None,
            release_hook: None,
        }
    }

    /// Registers a hook invoked when the handle is released.
    ///
    /// Lets tests observe teardown ordering.
    #[must_use]
    pub fn with_release_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.release_hook = Some(Box::new(hook));
        self
    }

    /// The resolved device name this handle was created under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying CPAL device, if this handle has one.
    pub fn device(&self) -> Option<&cpal::Device> {
        self.device.as_ref()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        tracing::debug!(device = %self.name, "releasing output device");
        if let Some(mut hook) = self.release_hook.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("platform", &self.device.is_some())
            .finish()
    }
}

/// Constructs platform device handles for the arbiter.
///
/// One implementation per platform layer. [`CpalOpener`] is the production
/// opener; [`MockOpener`] exists so arbiter behavior is testable without
/// hardware.
pub trait DeviceOpener: Send {
    /// Claims the device for `kind`, resolving `name` against the
    /// platform's device list. An empty name selects a sensible default
    /// for the kind.
    fn open(&self, kind: DeviceKind, name: &str) -> Result<DeviceHandle, AudioOutputError>;
}

/// Opens output devices through CPAL.
#[derive(Debug, Default)]
pub struct CpalOpener;

impl DeviceOpener for CpalOpener {
    fn open(&self, kind: DeviceKind, name: &str) -> Result<DeviceHandle, AudioOutputError> {
        match kind {
            DeviceKind::DigitalPassthrough | DeviceKind::EncodedAc97 => {
                open_digital_device(name)
            }
            _ => open_pcm_device(name),
        }
    }
}

fn open_pcm_device(name: &str) -> Result<DeviceHandle, AudioOutputError> {
    let host = cpal::default_host();

    if name.is_empty() {
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDefaultDevice)?;
        let resolved = device.name().unwrap_or_else(|_| "default".to_string());
        tracing::debug!(device = %resolved, "opened default output device");
        return Ok(DeviceHandle::cpal(resolved, device));
    }

    let devices = host
        .output_devices()
        .map_err(|e| AudioOutputError::BackendError(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                tracing::debug!(device = %device_name, "opened output device");
                return Ok(DeviceHandle::cpal(device_name, device));
            }
        }
    }

    Err(AudioOutputError::DeviceNotFound {
        name: name.to_string(),
    })
}

/// Enumerates outputs looking for a digital-capable device: an exact match
/// on the configured name first, then anything that looks like a digital
/// port.
fn open_digital_device(name: &str) -> Result<DeviceHandle, AudioOutputError> {
    let host = cpal::default_host();
    let devices: Vec<_> = host
        .output_devices()
        .map_err(|e| AudioOutputError::BackendError(e.to_string()))?
        .collect();

    if !name.is_empty() {
        for device in &devices {
            if device.name().is_ok_and(|n| n == name) {
                tracing::debug!(device = %name, "opened digital output device");
                return Ok(DeviceHandle::cpal(name, device.clone()));
            }
        }
    }

    for device in &devices {
        if let Ok(device_name) = device.name() {
            let lowered = device_name.to_ascii_lowercase();
            if DIGITAL_NAME_HINTS.iter().any(|hint| lowered.contains(hint)) {
                tracing::debug!(device = %device_name, "opened digital output device");
                return Ok(DeviceHandle::cpal(device_name, device.clone()));
            }
        }
    }

    Err(AudioOutputError::NoDigitalDevice)
}

/// A device opener that claims nothing, for testing without hardware.
///
/// Records every open call so tests can assert on arbitration behavior
/// (idempotent fast paths, teardown-before-recreate ordering). Can be
/// configured to fail, exercising the arbiter's fail-closed path.
///
/// # Example
///
/// ```
/// use audio_output::{DeviceArbiter, DeviceKind, MockOpener, OutputSettings};
///
/// let opener = MockOpener::new();
/// let opens = opener.opens();
/// let mut arbiter = DeviceArbiter::with_opener(Box::new(opener));
///
/// arbiter
///     .set_active_device(DeviceKind::DirectOutput, &OutputSettings::default())
///     .unwrap();
/// assert_eq!(opens.lock().len(), 1);
/// ```
#[derive(Default)]
pub struct MockOpener {
    opens: std::sync::Arc<parking_lot::Mutex<Vec<(DeviceKind, String)>>>,
    fail: bool,
}

impl MockOpener {
    /// Creates a mock opener that succeeds for every kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock opener whose every open attempt fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            opens: std::sync::Arc::default(),
            fail: true,
        }
    }

    /// Shared log of `(kind, name)` pairs passed to [`DeviceOpener::open`].
    #[must_use]
    pub fn opens(&self) -> std::sync::Arc<parking_lot::Mutex<Vec<(DeviceKind, String)>>> {
        self.opens.clone()
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self, kind: DeviceKind, name: &str) -> Result<DeviceHandle, AudioOutputError> {
        self.opens.lock().push((kind, name.to_string()));
        if self.fail {
            return Err(AudioOutputError::DeviceNotFound {
                name: name.to_string(),
            });
        }
        Ok(DeviceHandle::detached(name))
    }
}

/// Lists all available output devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_output_devices() -> Result<Vec<String>, AudioOutputError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioOutputError::BackendError(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default output device, if any.
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}
