//! Client fingerprint sent with `initConnection`.
//!
//! Drawn once per [`crate::Courier`] and never regenerated, so every call the
//! process makes presents the same device.

use rand::Rng;
use rand::seq::SliceRandom;

const DEVICE_MODELS: &[&str] = &[
    "Samsung Galaxy S23",
    "Samsung Galaxy A54",
    "Google Pixel 7",
    "Google Pixel 8 Pro",
    "Xiaomi 13T",
    "OnePlus 11",
    "iPhone 14",
    "iPhone 15 Pro",
    "Desktop",
    "MacBook Pro",
];

const ANDROID_VERSIONS: &[&str] = &["Android 12", "Android 13", "Android 14"];
const IOS_VERSIONS:     &[&str] = &["iOS 16.6", "iOS 17.2", "iOS 17.4"];
const DESKTOP_VERSIONS: &[&str] = &["Windows 10", "Windows 11", "macOS 14.3", "Ubuntu 22.04"];

const APP_VERSIONS: &[&str] = &["10.6.2", "10.8.1", "10.9.1", "10.10.0", "10.11.1"];

const LANG_CODES: &[&str] = &["en", "en", "en", "de", "es"];

/// Device / OS / app-version fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Profile {
    pub device_model:   String,
    pub system_version: String,
    pub app_version:    String,
    pub lang_code:      String,
}

impl Profile {
    /// Draw a coherent fingerprint: the OS matches the chosen device family.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let device = pick(rng, DEVICE_MODELS);
        let systems = if device.starts_with("iPhone") {
            IOS_VERSIONS
        } else if device == "Desktop" || device.starts_with("MacBook") {
            DESKTOP_VERSIONS
        } else {
            ANDROID_VERSIONS
        };
        // A MacBook claiming Windows would stand out.
        let system = if device.starts_with("MacBook") {
            "macOS 14.3"
        } else {
            pick(rng, systems)
        };
        Self {
            device_model:   device.to_string(),
            system_version: system.to_string(),
            app_version:    pick(rng, APP_VERSIONS).to_string(),
            lang_code:      pick(rng, LANG_CODES).to_string(),
        }
    }
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, from: &[&'a str]) -> &'a str {
    from.choose(rng).copied().unwrap_or(from[0])
}
