//! Resolution presets and the fallback used when hardware lacks a tier.

use std::fmt;
use std::str::FromStr;

use crate::traits::UnknownVariant;

/// Named output-size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionPreset {
    /// 3840x2160.
    Uhd2160,
    /// 1920x1080.
    Fhd1080,
    /// 1280x720.
    Hd720,
    /// 960x540.
    Qhd540,
    /// 640x480.
    Sd480,
}

impl ResolutionPreset {
    /// Every tier, highest first.
    pub const ALL: [Self; 5] = [
        Self::Uhd2160,
        Self::Fhd1080,
        Self::Hd720,
        Self::Qhd540,
        Self::Sd480,
    ];

    /// Preset used when the creation params do not name one.
    pub const DEFAULT: Self = Self::Fhd1080;

    /// Wire label, e.g. `"1080p"`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uhd2160 => "2160p",
            Self::Fhd1080 => "1080p",
            Self::Hd720 => "720p",
            Self::Qhd540 => "540p",
            Self::Sd480 => "480p",
        }
    }

    /// Frame size in pixels as `(width, height)`.
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Uhd2160 => (3840, 2160),
            Self::Fhd1080 => (1920, 1080),
            Self::Hd720 => (1280, 720),
            Self::Qhd540 => (960, 540),
            Self::Sd480 => (640, 480),
        }
    }

    /// The next tier down, or `None` for the lowest.
    #[must_use]
    pub const fn next_lower(self) -> Option<Self> {
        match self {
            Self::Uhd2160 => Some(Self::Fhd1080),
            Self::Fhd1080 => Some(Self::Hd720),
            Self::Hd720 => Some(Self::Qhd540),
            Self::Qhd540 => Some(Self::Sd480),
            Self::Sd480 => None,
        }
    }
}

impl FromStr for ResolutionPreset {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.label() == s)
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

impl fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the library is asked to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSelector {
    /// A specific supported tier.
    Preset(ResolutionPreset),
    /// The largest size the hardware offers.
    BestAvailable,
}

impl SizeSelector {
    /// Walk down from `requested` to the first tier `supports` accepts.
    ///
    /// Falls back to [`SizeSelector::BestAvailable`] when no tier at or below
    /// the request is supported.
    pub fn select<F>(requested: ResolutionPreset, supports: F) -> Self
    where
        F: Fn(ResolutionPreset) -> bool,
    {
        let mut candidate = Some(requested);
        while let Some(preset) = candidate {
            if supports(preset) {
                return Self::Preset(preset);
            }
            candidate = preset.next_lower();
        }
        Self::BestAvailable
    }

    /// Like [`SizeSelector::select`], starting from a wire label.
    ///
    /// Unknown labels select [`SizeSelector::BestAvailable`].
    pub fn from_label<F>(label: &str, supports: F) -> Self
    where
        F: Fn(ResolutionPreset) -> bool,
    {
        label
            .parse::<ResolutionPreset>()
            .map_or(Self::BestAvailable, |preset| Self::select(preset, supports))
    }

    /// Pixel dimensions, if this selector names a tier.
    #[must_use]
    pub const fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            Self::Preset(preset) => Some(preset.dimensions()),
            Self::BestAvailable => None,
        }
    }
}
