//! Exclusive arbitration of the shared hardware audio device.
//!
//! Exactly one subsystem may hold the hardware output at a time: main
//! playback, GUI sound effects, or an external-process handoff. The
//! [`DeviceArbiter`] owns the single [`DeviceHandle`] and mediates every
//! transition. Speaker routing changes are never applied to a live handle -
//! the arbiter tears the device down and the caller recreates it under the
//! new routing.
//!
//! The arbiter is an explicitly constructed value, shared between the
//! playback engine and other consumers on the same control thread (wrap it
//! in a [`SharedArbiter`] to let sinks relinquish the device on drop).
//! Callers must serialize their own use; there is no internal cross-thread
//! coordination beyond the mutex of the shared wrapper.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{CpalOpener, DeviceHandle, DeviceOpener};
use crate::{AudioOutputError, OutputSettings};

/// Which subsystem-facing device configuration is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// No device is held.
    #[default]
    None,
    /// Default output, (re)initialized by the registered observer rather
    /// than by the arbiter itself.
    Default,
    /// Exclusive PCM output for playback.
    DirectOutput,
    /// Compressed audio forwarded to an external receiver for decoding.
    DigitalPassthrough,
    /// AC97-encoded output.
    EncodedAc97,
}

/// Speaker routing computed from channel count and settings.
///
/// Transient: recomputed on every [`DeviceArbiter::setup_speaker_config`]
/// call, never persisted anywhere but the arbiter's record of what the
/// live handle was created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeakerLayout {
    /// Platform default routing (multi-channel or encoder-managed).
    #[default]
    Default,
    /// Single-channel routing.
    Mono,
    /// Two-channel routing.
    Stereo,
}

/// Receives synchronous notifications when the active device changes.
///
/// `on_deinitialize` fires before the old handle is released so dependents
/// can tear down first; `on_initialize` fires after a new device is fully
/// constructed (or, for [`DeviceKind::Default`], as the signal to perform
/// default-device setup themselves).
pub trait DeviceObserver: Send {
    /// A device of `kind` became active.
    fn on_initialize(&self, kind: DeviceKind);

    /// The device of `kind` is about to be released.
    fn on_deinitialize(&self, kind: DeviceKind);
}

/// A [`DeviceArbiter`] shared between the playback engine and its sinks.
///
/// Sinks keep a clone so `deinitialize` (and drop) can relinquish the
/// device without the caller threading the arbiter through every call.
pub type SharedArbiter = Arc<Mutex<DeviceArbiter>>;

/// Owns and arbitrates the single shared hardware audio handle.
pub struct DeviceArbiter {
    active_kind: DeviceKind,
    active_name: String,
    handle: Option<DeviceHandle>,
    layout: SpeakerLayout,
    ac3_active: bool,
    observer: Option<Arc<dyn DeviceObserver>>,
    opener: Box<dyn DeviceOpener>,
}

impl DeviceArbiter {
    /// Creates an arbiter backed by the CPAL platform opener.
    #[must_use]
    pub fn new() -> Self {
        Self::with_opener(Box::new(CpalOpener))
    }

    /// Creates an arbiter with a custom device opener.
    ///
    /// Tests use this with [`MockOpener`](crate::MockOpener) to exercise
    /// arbitration without hardware.
    #[must_use]
    pub fn with_opener(opener: Box<dyn DeviceOpener>) -> Self {
        Self {
            active_kind: DeviceKind::None,
            active_name: String::new(),
            handle: None,
            layout: SpeakerLayout::default(),
            ac3_active: false,
            observer: None,
            opener,
        }
    }

    /// Wraps the arbiter for sharing with sinks.
    #[must_use]
    pub fn into_shared(self) -> SharedArbiter {
        Arc::new(Mutex::new(self))
    }

    /// Registers the device-changed observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: Arc<dyn DeviceObserver>) {
        self.observer = Some(observer);
    }

    /// Returns the currently active device kind. Pure query.
    #[must_use]
    pub fn get_active_device(&self) -> DeviceKind {
        self.active_kind
    }

    /// Returns the handle to the active device, if one is held.
    #[must_use]
    pub fn active_handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    /// The speaker routing the live handle was created under.
    #[must_use]
    pub fn speaker_layout(&self) -> SpeakerLayout {
        self.layout
    }

    /// True iff the active device is an encoded/digital passthrough kind.
    #[must_use]
    pub fn is_passthrough_active(&self) -> bool {
        matches!(
            self.active_kind,
            DeviceKind::DigitalPassthrough | DeviceKind::EncodedAc97
        )
    }

    /// Whether the last speaker configuration engaged the AC3 encoder.
    #[must_use]
    pub fn is_ac3_encoder_active(&self) -> bool {
        self.ac3_active
    }

    /// Makes `kind` the active device, tearing down whatever was active.
    ///
    /// Idempotent fast path: if `kind` is already active under the same
    /// resolved device name, nothing happens. [`DeviceKind::Default`] never
    /// constructs a platform handle here - default-device setup is owned by
    /// the observer, which is notified instead. [`DeviceKind::None`] is
    /// equivalent to [`remove_active_device`](Self::remove_active_device).
    ///
    /// # Errors
    ///
    /// Platform construction failures are logged and returned; the arbiter
    /// is left in the `None` state (fail-closed), never with a
    /// half-constructed handle marked active.
    pub fn set_active_device(
        &mut self,
        kind: DeviceKind,
        settings: &OutputSettings,
    ) -> Result<(), AudioOutputError> {
        if kind == DeviceKind::None {
            self.remove_active_device();
            return Ok(());
        }

        let name = resolve_device_name(kind, settings);
        if kind == self.active_kind && name == self.active_name {
            // Same device under the same name: nothing to rebuild.
            return Ok(());
        }

        self.remove_active_device();

        if kind == DeviceKind::Default {
            self.active_kind = DeviceKind::Default;
            self.active_name = name;
            self.notify_initialize(DeviceKind::Default);
            return Ok(());
        }

        match self.opener.open(kind, &name) {
            Ok(handle) => {
                tracing::debug!(?kind, device = %handle.name(), "active output device set");
                self.handle = Some(handle);
                self.active_kind = kind;
                self.active_name = name;
                self.notify_initialize(kind);
                Ok(())
            }
            Err(e) => {
                tracing::error!(?kind, device = %name, error = %e, "failed to set active device");
                Err(e)
            }
        }
    }

    /// Releases the active device and returns the arbiter to `None`.
    ///
    /// The observer is notified with the current kind *before* the handle
    /// is released, so dependents tear down first. Safe to call when no
    /// device is active.
    pub fn remove_active_device(&mut self) {
        if self.active_kind != DeviceKind::None {
            self.notify_deinitialize(self.active_kind);
        }
        // Dropping the handle releases the platform claim.
        self.handle = None;
        self.active_kind = DeviceKind::None;
        self.active_name.clear();
    }

    /// Recomputes speaker routing for the requested channel count.
    ///
    /// Returns whether multi-speaker duplication is in effect. If the
    /// computed routing differs from what the live handle was created
    /// under, the device is torn down so the caller is forced to recreate
    /// it - routing changes are never applied to a live handle.
    pub fn setup_speaker_config(
        &mut self,
        channels: u16,
        all_speakers: bool,
        is_music: bool,
        settings: &OutputSettings,
    ) -> bool {
        let duplicate_requested = all_speakers && !is_music;

        let (layout, duplicated, ac3_active) =
            if settings.passthrough_enabled && duplicate_requested && settings.ac3_encoder {
                (SpeakerLayout::Default, true, true)
            } else if channels == 1 {
                (SpeakerLayout::Mono, false, false)
            } else if channels == 2 {
                (SpeakerLayout::Stereo, false, false)
            } else {
                (SpeakerLayout::Default, false, settings.ac3_encoder)
            };

        if self.handle.is_some() && layout != self.layout {
            tracing::debug!(
                old = ?self.layout,
                new = ?layout,
                "speaker routing changed, tearing down active device"
            );
            self.remove_active_device();
        }

        self.layout = layout;
        self.ac3_active = ac3_active;
        duplicated
    }

    fn notify_initialize(&self, kind: DeviceKind) {
        if let Some(ref observer) = self.observer {
            observer.on_initialize(kind);
        }
    }

    fn notify_deinitialize(&self, kind: DeviceKind) {
        if let Some(ref observer) = self.observer {
            observer.on_deinitialize(kind);
        }
    }
}

impl Default for DeviceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceArbiter {
    fn drop(&mut self) {
        // Process teardown must release any held handle.
        self.remove_active_device();
    }
}

fn resolve_device_name(kind: DeviceKind, settings: &OutputSettings) -> String {
    match kind {
        DeviceKind::DigitalPassthrough | DeviceKind::EncodedAc97 => {
            settings.passthrough_device.clone()
        }
        _ => settings.audio_device.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockOpener;
    use parking_lot::Mutex as PlMutex;

    /// Records observer notifications in order.
    struct RecordingObserver {
        log: Arc<PlMutex<Vec<(bool, DeviceKind)>>>,
    }

    impl DeviceObserver for RecordingObserver {
        fn on_initialize(&self, kind: DeviceKind) {
            self.log.lock().push((true, kind));
        }

        fn on_deinitialize(&self, kind: DeviceKind) {
            self.log.lock().push((false, kind));
        }
    }

    fn mock_arbiter() -> (DeviceArbiter, Arc<PlMutex<Vec<(DeviceKind, String)>>>) {
        let opener = MockOpener::new();
        let opens = opener.opens();
        (DeviceArbiter::with_opener(Box::new(opener)), opens)
    }

    #[test]
    fn test_starts_with_no_device() {
        let (arbiter, _) = mock_arbiter();
        assert_eq!(arbiter.get_active_device(), DeviceKind::None);
        assert!(arbiter.active_handle().is_none());
    }

    #[test]
    fn test_set_active_device_constructs_handle() {
        let (mut arbiter, opens) = mock_arbiter();
        let settings = OutputSettings {
            audio_device: "card0".to_string(),
            ..Default::default()
        };

        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();

        assert_eq!(arbiter.get_active_device(), DeviceKind::DirectOutput);
        assert_eq!(
            opens.lock().as_slice(),
            &[(DeviceKind::DirectOutput, "card0".to_string())]
        );
    }

    #[test]
    fn test_idempotent_fast_path() {
        let (mut arbiter, opens) = mock_arbiter();
        let settings = OutputSettings::default();

        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();

        // Second call is a no-op: no handle re-creation.
        assert_eq!(opens.lock().len(), 1);
    }

    #[test]
    fn test_device_name_change_rebuilds() {
        let (mut arbiter, opens) = mock_arbiter();

        let settings = OutputSettings {
            audio_device: "card0".to_string(),
            ..Default::default()
        };
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();

        let settings = OutputSettings {
            audio_device: "card1".to_string(),
            ..Default::default()
        };
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();

        assert_eq!(opens.lock().len(), 2);
        assert_eq!(arbiter.active_handle().unwrap().name(), "card1");
    }

    #[test]
    fn test_switching_kinds_tears_down_first() {
        let (mut arbiter, _) = mock_arbiter();
        let log = Arc::new(PlMutex::new(Vec::new()));
        arbiter.set_observer(Arc::new(RecordingObserver { log: log.clone() }));

        let settings = OutputSettings::default();
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();
        arbiter
            .set_active_device(DeviceKind::DigitalPassthrough, &settings)
            .unwrap();

        let log = log.lock();
        assert_eq!(
            log.as_slice(),
            &[
                (true, DeviceKind::DirectOutput),
                (false, DeviceKind::DirectOutput),
                (true, DeviceKind::DigitalPassthrough),
            ]
        );
    }

    #[test]
    fn test_default_kind_notifies_without_constructing() {
        let (mut arbiter, opens) = mock_arbiter();
        let log = Arc::new(PlMutex::new(Vec::new()));
        arbiter.set_observer(Arc::new(RecordingObserver { log: log.clone() }));

        arbiter
            .set_active_device(DeviceKind::Default, &OutputSettings::default())
            .unwrap();

        assert_eq!(arbiter.get_active_device(), DeviceKind::Default);
        assert!(arbiter.active_handle().is_none());
        assert!(opens.lock().is_empty());
        assert_eq!(log.lock().as_slice(), &[(true, DeviceKind::Default)]);
    }

    #[test]
    fn test_construction_failure_is_fail_closed() {
        let mut arbiter = DeviceArbiter::with_opener(Box::new(MockOpener::failing()));
        let result = arbiter.set_active_device(DeviceKind::DirectOutput, &OutputSettings::default());

        assert!(result.is_err());
        assert_eq!(arbiter.get_active_device(), DeviceKind::None);
        assert!(arbiter.active_handle().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut arbiter, _) = mock_arbiter();
        arbiter.remove_active_device();
        arbiter.remove_active_device();
        assert_eq!(arbiter.get_active_device(), DeviceKind::None);
    }

    #[test]
    fn test_remove_notifies_before_release() {
        let (mut arbiter, _) = mock_arbiter();
        let log = Arc::new(PlMutex::new(Vec::new()));
        arbiter.set_observer(Arc::new(RecordingObserver { log: log.clone() }));

        arbiter
            .set_active_device(DeviceKind::DirectOutput, &OutputSettings::default())
            .unwrap();
        arbiter.remove_active_device();

        assert_eq!(arbiter.get_active_device(), DeviceKind::None);
        assert_eq!(
            log.lock().last().unwrap(),
            &(false, DeviceKind::DirectOutput)
        );
    }

    #[test]
    fn test_passthrough_query() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings::default();

        assert!(!arbiter.is_passthrough_active());

        arbiter
            .set_active_device(DeviceKind::DigitalPassthrough, &settings)
            .unwrap();
        assert!(arbiter.is_passthrough_active());

        arbiter
            .set_active_device(DeviceKind::EncodedAc97, &settings)
            .unwrap();
        assert!(arbiter.is_passthrough_active());

        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();
        assert!(!arbiter.is_passthrough_active());
    }

    #[test]
    fn test_speaker_config_mono_stereo() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings::default();

        assert!(!arbiter.setup_speaker_config(1, false, true, &settings));
        assert_eq!(arbiter.speaker_layout(), SpeakerLayout::Mono);

        assert!(!arbiter.setup_speaker_config(2, false, true, &settings));
        assert_eq!(arbiter.speaker_layout(), SpeakerLayout::Stereo);
        assert!(!arbiter.is_ac3_encoder_active());
    }

    #[test]
    fn test_speaker_config_all_speakers_with_encoder() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings {
            passthrough_enabled: true,
            ac3_encoder: true,
            ..Default::default()
        };

        let duplicated = arbiter.setup_speaker_config(2, true, false, &settings);
        assert!(duplicated);
        assert_eq!(arbiter.speaker_layout(), SpeakerLayout::Default);
        assert!(arbiter.is_ac3_encoder_active());
    }

    #[test]
    fn test_speaker_config_all_speakers_ignored_for_music() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings {
            passthrough_enabled: true,
            ac3_encoder: true,
            ..Default::default()
        };

        let duplicated = arbiter.setup_speaker_config(2, true, true, &settings);
        assert!(!duplicated);
        assert_eq!(arbiter.speaker_layout(), SpeakerLayout::Stereo);
    }

    #[test]
    fn test_speaker_config_multichannel_without_passthrough() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings {
            ac3_encoder: true,
            ..Default::default()
        };

        let duplicated = arbiter.setup_speaker_config(6, false, false, &settings);
        assert!(!duplicated);
        assert_eq!(arbiter.speaker_layout(), SpeakerLayout::Default);
        // Encoder-active reflects the encoder's own enablement, not forced.
        assert!(arbiter.is_ac3_encoder_active());
    }

    #[test]
    fn test_layout_change_tears_down_live_handle() {
        let (mut arbiter, _) = mock_arbiter();
        let settings = OutputSettings::default();

        arbiter.setup_speaker_config(2, false, false, &settings);
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &settings)
            .unwrap();
        assert!(arbiter.active_handle().is_some());

        // Same layout: device survives.
        arbiter.setup_speaker_config(2, false, false, &settings);
        assert!(arbiter.active_handle().is_some());

        // Mono now: device must be torn down for recreation.
        arbiter.setup_speaker_config(1, false, false, &settings);
        assert!(arbiter.active_handle().is_none());
        assert_eq!(arbiter.get_active_device(), DeviceKind::None);
    }

    #[test]
    fn test_drop_releases_handle() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct HookOpener {
            released: Arc<AtomicUsize>,
        }

        impl DeviceOpener for HookOpener {
            fn open(
                &self,
                _kind: DeviceKind,
                name: &str,
            ) -> Result<DeviceHandle, AudioOutputError> {
                let released = self.released.clone();
                Ok(DeviceHandle::detached(name).with_release_hook(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                }))
            }
        }

        let released = Arc::new(AtomicUsize::new(0));
        let mut arbiter = DeviceArbiter::with_opener(Box::new(HookOpener {
            released: released.clone(),
        }));
        arbiter
            .set_active_device(DeviceKind::DirectOutput, &OutputSettings::default())
            .unwrap();

        drop(arbiter);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
