//! Host platform to ffmpeg input mapping.

use anyhow::{bail, Result};
use std::env::consts::OS;

/// Operating systems with a known ffmpeg capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    MacOs,
    Linux,
    Windows,
}

impl HostPlatform {
    /// Map an `std::env::consts::OS` identifier; `None` for anything without a backend.
    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "macos" => Some(HostPlatform::MacOs),
            "linux" => Some(HostPlatform::Linux),
            "windows" => Some(HostPlatform::Windows),
            _ => None,
        }
    }

    pub fn current() -> Result<Self> {
        match Self::from_os(OS) {
            Some(platform) => Ok(platform),
            None => bail!("unsupported OS for audio capture: {OS}"),
        }
    }
}

/// ffmpeg input format plus the device it opens when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBackend {
    pub format: &'static str,
    pub default_device: &'static str,
}

pub fn input_backend(platform: HostPlatform) -> InputBackend {
    match platform {
        HostPlatform::MacOs => InputBackend {
            format: "avfoundation",
            default_device: ":0",
        },
        HostPlatform::Linux => InputBackend {
            format: "pulse",
            default_device: "default",
        },
        HostPlatform::Windows => InputBackend {
            format: "dshow",
            default_device: "audio=Microphone (Default)",
        },
    }
}

/// The override wins whenever it is non-blank.
pub fn resolve_device<'a>(platform: HostPlatform, device_override: Option<&'a str>) -> &'a str {
    match device_override {
        Some(device) if !device.trim().is_empty() => device,
        _ => input_backend(platform).default_device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_platform_to_its_backend() {
        assert_eq!(input_backend(HostPlatform::MacOs).format, "avfoundation");
        assert_eq!(input_backend(HostPlatform::MacOs).default_device, ":0");
        assert_eq!(input_backend(HostPlatform::Linux).format, "pulse");
        assert_eq!(input_backend(HostPlatform::Linux).default_device, "default");
        assert_eq!(input_backend(HostPlatform::Windows).format, "dshow");
        assert_eq!(
            input_backend(HostPlatform::Windows).default_device,
            "audio=Microphone (Default)"
        );
    }

    #[test]
    fn parses_os_identifiers() {
        assert_eq!(HostPlatform::from_os("macos"), Some(HostPlatform::MacOs));
        assert_eq!(HostPlatform::from_os("linux"), Some(HostPlatform::Linux));
        assert_eq!(HostPlatform::from_os("windows"), Some(HostPlatform::Windows));
        assert_eq!(HostPlatform::from_os("freebsd"), None);
    }

    #[test]
    fn override_replaces_default_device() {
        assert_eq!(resolve_device(HostPlatform::Linux, None), "default");
        assert_eq!(resolve_device(HostPlatform::Linux, Some("hw:1")), "hw:1");
        assert_eq!(resolve_device(HostPlatform::MacOs, Some("  ")), ":0");
    }
}
