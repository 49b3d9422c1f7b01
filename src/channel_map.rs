//! Codec-specific channel orderings.
//!
//! Output channel order is not canonical across codecs: an AAC decoder
//! emits the center channel first, Vorbis puts it second, and WAV-style
//! PCM puts it third. A sink that assumes one ordering for all sources
//! silently swaps speakers. The tables here map a decoder's codec hint to
//! the interleaving order of the PCM it produces, so the device backend
//! can permute frames into the layout the platform expects.

/// A physical speaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Low-frequency effects (subwoofer).
    LowFrequency,
    /// Back left.
    BackLeft,
    /// Back right.
    BackRight,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
}

use Speaker::{
    BackLeft, BackRight, FrontCenter, FrontLeft, FrontRight, LowFrequency, SideLeft, SideRight,
};

// WAV/DMO ordering, also what the platform mixer expects.
const WAV_ORDER: [Speaker; 8] = [
    FrontLeft,
    FrontRight,
    FrontCenter,
    LowFrequency,
    BackLeft,
    BackRight,
    SideLeft,
    SideRight,
];

// AAC decoders emit center first.
const AAC_3: [Speaker; 3] = [FrontCenter, FrontLeft, FrontRight];
const AAC_5: [Speaker; 5] = [FrontCenter, FrontLeft, FrontRight, BackLeft, BackRight];
const AAC_6: [Speaker; 6] = [
    FrontCenter,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    LowFrequency,
];

// Vorbis interleaves center between the front pair.
const VORBIS_3: [Speaker; 3] = [FrontLeft, FrontCenter, FrontRight];
const VORBIS_5: [Speaker; 5] = [FrontLeft, FrontCenter, FrontRight, BackLeft, BackRight];
const VORBIS_6: [Speaker; 6] = [
    FrontLeft,
    FrontCenter,
    FrontRight,
    BackLeft,
    BackRight,
    LowFrequency,
];

/// Returns the interleaving order of PCM produced for the given codec hint.
///
/// Hints are matched case-insensitively by substring ("AAC", "OggVorbis",
/// "DMO", "PCM", ...). Unknown hints, mono, and stereo all resolve to the
/// WAV ordering. Channel counts above 8 are truncated to the first 8
/// positions.
///
/// # Example
///
/// ```
/// use audio_output::channel_map::{channel_map, Speaker};
///
/// let order = channel_map("AAC", 6);
/// assert_eq!(order[0], Speaker::FrontCenter);
///
/// let order = channel_map("PCM", 6);
/// assert_eq!(order[0], Speaker::FrontLeft);
/// ```
#[must_use]
pub fn channel_map(codec_hint: &str, channels: u16) -> &'static [Speaker] {
    let channels = (channels as usize).min(WAV_ORDER.len());
    if channels <= 2 {
        return &WAV_ORDER[..channels];
    }

    let hint = codec_hint.to_ascii_lowercase();
    if hint.contains("aac") {
        match channels {
            3 => &AAC_3,
            5 => &AAC_5,
            6 => &AAC_6,
            _ => &WAV_ORDER[..channels],
        }
    } else if hint.contains("vorbis") || hint.contains("ogg") {
        match channels {
            3 => &VORBIS_3,
            5 => &VORBIS_5,
            6 => &VORBIS_6,
            _ => &WAV_ORDER[..channels],
        }
    } else {
        &WAV_ORDER[..channels]
    }
}

/// Computes the permutation from a source ordering to the platform (WAV)
/// ordering.
///
/// `result[i]` is the index within a source frame holding the sample for
/// platform channel slot `i`. Returns `None` when the source already uses
/// the platform ordering, so the hot path can skip the permutation
/// entirely.
#[must_use]
pub(crate) fn reorder_indices(source: &[Speaker]) -> Option<Vec<usize>> {
    let canonical = &WAV_ORDER[..source.len()];
    if source == canonical {
        return None;
    }

    let indices = canonical
        .iter()
        .map(|speaker| {
            source
                .iter()
                .position(|s| s == speaker)
                // Orderings are permutations of the same speakers, so every
                // position resolves; fall back to slot 0 rather than panic.
                .unwrap_or(0)
        })
        .collect();
    Some(indices)
}
