//! Device capability detection and model-size classification.
//!
//! Raw environment signals are collected into [`CapabilitySignals`] by a
//! [`CapabilityProbe`] and normalized by [`DeviceCapabilities::from_signals`].
//! Every signal except the viewport is optional; missing or garbage values
//! fall back to fixed defaults (8 GB memory, laptop, medium network).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Memory assumed when the environment does not expose it.
pub const DEFAULT_MEMORY_GB: f64 = 8.0;
/// Floor for the available-memory estimate.
pub const MIN_AVAILABLE_MEMORY_GB: f64 = 1.0;
/// Share of total memory assumed usable by models.
const AVAILABLE_MEMORY_RATIO: f64 = 0.7;

/// Viewport used when a native host has no window to measure.
pub const DEFAULT_VIEWPORT: (u32, u32) = (1440, 900);

static MOBILE_UA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)iphone|ipod|windows phone|blackberry|android.*mobile|\bmobi").unwrap()
});
static TABLET_UA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ipad|tablet|kindle|silk|playbook").unwrap());

/// Coarse form factor of the host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Laptop,
    Desktop,
    Workstation,
}

impl DeviceClass {
    /// Baseline VRAM estimate (GB) and processing-power seed for the class.
    fn baseline(self) -> (f64, ProcessingPower) {
        match self {
            Self::Mobile => (1.0, ProcessingPower::Low),
            Self::Tablet => (2.0, ProcessingPower::Medium),
            Self::Laptop => (4.0, ProcessingPower::Medium),
            Self::Desktop => (8.0, ProcessingPower::High),
            Self::Workstation => (16.0, ProcessingPower::VeryHigh),
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mobile => write!(f, "mobile"),
            Self::Tablet => write!(f, "tablet"),
            Self::Laptop => write!(f, "laptop"),
            Self::Desktop => write!(f, "desktop"),
            Self::Workstation => write!(f, "workstation"),
        }
    }
}

/// Network speed class, used to warn about large downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    Slow,
    Medium,
    Fast,
}

impl std::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Medium => write!(f, "medium"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Processing tier. Ordered: a tier covers every tier at or below it.
///
/// Also used for a model's processing intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingPower {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ProcessingPower {
    /// Whether a device of this tier can handle work of `intensity`.
    pub fn covers(self, intensity: ProcessingPower) -> bool {
        self >= intensity
    }

    /// Tier from logical cores and total memory.
    pub fn from_cores_and_memory(cores: u32, memory_gb: f64) -> Self {
        if cores >= 12 && memory_gb >= 16.0 {
            Self::VeryHigh
        } else if cores >= 8 && memory_gb >= 8.0 {
            Self::High
        } else if cores >= 4 && memory_gb >= 4.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for ProcessingPower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "very-high"),
        }
    }
}

/// Largest model size class the device is expected to handle well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Raw, possibly incomplete environment signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySignals {
    /// Approximate device memory in GB.
    #[serde(default)]
    pub device_memory_gb: Option<f64>,
    /// Logical core count.
    #[serde(default)]
    pub hardware_concurrency: Option<u32>,
    /// Network effective type, e.g. `"4g"`.
    #[serde(default)]
    pub effective_network_type: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for CapabilitySignals {
    fn default() -> Self {
        Self {
            device_memory_gb: None,
            hardware_concurrency: None,
            effective_network_type: None,
            viewport_width: DEFAULT_VIEWPORT.0,
            viewport_height: DEFAULT_VIEWPORT.1,
            user_agent: None,
        }
    }
}

/// Normalized capability snapshot. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    #[serde(rename = "totalMemoryGB")]
    pub total_memory_gb: f64,
    #[serde(rename = "availableMemoryGB")]
    pub available_memory_gb: f64,
    #[serde(rename = "estimatedVRAMGB")]
    pub estimated_vram_gb: f64,
    pub device_class: DeviceClass,
    pub network_class: NetworkClass,
    pub processing_power: ProcessingPower,
    pub recommended_model_size: ModelSize,
}

impl DeviceCapabilities {
    /// Normalize raw signals into a snapshot. Never fails.
    pub fn from_signals(signals: &CapabilitySignals) -> Self {
        let total_memory_gb = Self::memory_gb(signals.device_memory_gb);
        let available_memory_gb =
            (total_memory_gb * AVAILABLE_MEMORY_RATIO).max(MIN_AVAILABLE_MEMORY_GB);

        let device_class = Self::classify_device(
            signals.viewport_width,
            signals.viewport_height,
            signals.user_agent.as_deref(),
        );
        let (estimated_vram_gb, seed) = device_class.baseline();

        let network_class = Self::classify_network(signals.effective_network_type.as_deref());

        let processing_power = match signals.hardware_concurrency.filter(|c| *c > 0) {
            Some(cores) => ProcessingPower::from_cores_and_memory(cores, total_memory_gb),
            None => {
                debug!("Core count unavailable, keeping {} seed for {}", seed, device_class);
                seed
            }
        };

        let recommended_model_size =
            Self::recommend_size(total_memory_gb, processing_power);

        Self {
            total_memory_gb,
            available_memory_gb,
            estimated_vram_gb,
            device_class,
            network_class,
            processing_power,
            recommended_model_size,
        }
    }

    fn memory_gb(signal: Option<f64>) -> f64 {
        match signal {
            Some(gb) if gb.is_finite() && gb > 0.0 => gb,
            Some(gb) => {
                debug!("Ignoring unusable memory signal {}", gb);
                DEFAULT_MEMORY_GB
            }
            None => DEFAULT_MEMORY_GB,
        }
    }

    /// Classify the form factor from viewport size and user-agent hints.
    pub fn classify_device(width: u32, height: u32, user_agent: Option<&str>) -> DeviceClass {
        let ua = user_agent.unwrap_or("");
        let mobile_hint = MOBILE_UA_RE.is_match(ua);
        let tablet_hint = !mobile_hint
            && (TABLET_UA_RE.is_match(ua) || ua.to_ascii_lowercase().contains("android"));

        if width < 768 || mobile_hint {
            DeviceClass::Mobile
        } else if width < 1024 || tablet_hint {
            DeviceClass::Tablet
        } else if width >= 2560 && height >= 1440 {
            DeviceClass::Workstation
        } else if width >= 1920 {
            DeviceClass::Desktop
        } else {
            DeviceClass::Laptop
        }
    }

    /// Map a network effective type to a speed class. Absent means medium.
    pub fn classify_network(effective_type: Option<&str>) -> NetworkClass {
        match effective_type.map(|t| t.trim().to_ascii_lowercase()) {
            None => NetworkClass::Medium,
            Some(t) => match t.as_str() {
                "4g" | "5g" => NetworkClass::Fast,
                "3g" => NetworkClass::Medium,
                _ => NetworkClass::Slow,
            },
        }
    }

    fn recommend_size(memory_gb: f64, power: ProcessingPower) -> ModelSize {
        if memory_gb >= 16.0 && power == ProcessingPower::VeryHigh {
            ModelSize::Large
        } else if memory_gb >= 8.0 && power >= ProcessingPower::Medium {
            ModelSize::Medium
        } else {
            ModelSize::Small
        }
    }
}

/// Anything that can report the host's capability signals.
///
/// Browser hosts hand their signals to a [`StaticProbe`]; native hosts use
/// [`SystemProbe`]. The scorer and lifecycle manager only ever see the
/// resulting [`DeviceCapabilities`].
pub trait CapabilityProbe: Send + Sync {
    fn signals(&self) -> CapabilitySignals;

    fn detect(&self) -> DeviceCapabilities {
        DeviceCapabilities::from_signals(&self.signals())
    }
}

/// Probe over a fixed set of signals.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    signals: CapabilitySignals,
}

impl StaticProbe {
    pub fn new(signals: CapabilitySignals) -> Self {
        Self { signals }
    }
}

impl CapabilityProbe for StaticProbe {
    fn signals(&self) -> CapabilitySignals {
        self.signals.clone()
    }
}

/// Native probe reading OS memory and CPU information.
///
/// Viewport and network type have no OS-level equivalent; they come from
/// the host (or `LOCALMIND_VIEWPORT=WxH` / `LOCALMIND_NETWORK_TYPE`).
#[derive(Debug, Clone)]
pub struct SystemProbe {
    pub viewport: (u32, u32),
    pub network_type: Option<String>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            viewport: DEFAULT_VIEWPORT,
            network_type: None,
        }
    }
}

impl SystemProbe {
    /// Build a probe, taking viewport and network hints from the environment.
    pub fn from_env() -> Self {
        let viewport = std::env::var("LOCALMIND_VIEWPORT")
            .ok()
            .and_then(|v| parse_viewport(&v))
            .unwrap_or(DEFAULT_VIEWPORT);
        let network_type = std::env::var("LOCALMIND_NETWORK_TYPE").ok();
        Self {
            viewport,
            network_type,
        }
    }

    fn total_memory_gb() -> Option<f64> {
        #[cfg(target_os = "linux")]
        {
            let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
            let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
            let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
            Some(kb as f64 / (1024.0 * 1024.0))
        }
        #[cfg(target_os = "macos")]
        {
            use std::process::Command;
            let output = Command::new("sysctl").arg("-n").arg("hw.memsize").output().ok()?;
            let bytes: u64 = String::from_utf8(output.stdout).ok()?.trim().parse().ok()?;
            Some(bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            None
        }
    }
}

impl CapabilityProbe for SystemProbe {
    fn signals(&self) -> CapabilitySignals {
        let hardware_concurrency = std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32);

        CapabilitySignals {
            device_memory_gb: Self::total_memory_gb(),
            hardware_concurrency,
            effective_network_type: self.network_type.clone(),
            viewport_width: self.viewport.0,
            viewport_height: self.viewport.1,
            user_agent: None,
        }
    }
}

fn parse_viewport(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(|c| c == 'x' || c == 'X')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(memory: Option<f64>, cores: Option<u32>, width: u32, height: u32) -> CapabilitySignals {
        CapabilitySignals {
            device_memory_gb: memory,
            hardware_concurrency: cores,
            effective_network_type: Some("4g".into()),
            viewport_width: width,
            viewport_height: height,
            user_agent: None,
        }
    }

    #[test]
    fn test_defaults_when_signals_missing() {
        let caps = DeviceCapabilities::from_signals(&CapabilitySignals::default());
        assert_eq!(caps.total_memory_gb, 8.0);
        assert!((caps.available_memory_gb - 5.6).abs() < 1e-9);
        assert_eq!(caps.device_class, DeviceClass::Laptop);
        assert_eq!(caps.network_class, NetworkClass::Medium);
        assert_eq!(caps.processing_power, ProcessingPower::Medium);
        assert_eq!(caps.recommended_model_size, ModelSize::Medium);
    }

    #[test]
    fn test_available_memory_floor() {
        let caps = DeviceCapabilities::from_signals(&signals(Some(1.0), Some(2), 1280, 800));
        assert_eq!(caps.available_memory_gb, 1.0);
    }

    #[test]
    fn test_garbage_memory_signal_uses_default() {
        for bad in [f64::NAN, f64::INFINITY, -4.0, 0.0] {
            let caps = DeviceCapabilities::from_signals(&signals(Some(bad), None, 1280, 800));
            assert_eq!(caps.total_memory_gb, DEFAULT_MEMORY_GB);
        }
    }

    #[test]
    fn test_device_classification() {
        assert_eq!(DeviceCapabilities::classify_device(375, 812, None), DeviceClass::Mobile);
        assert_eq!(DeviceCapabilities::classify_device(800, 1200, None), DeviceClass::Tablet);
        assert_eq!(DeviceCapabilities::classify_device(1440, 900, None), DeviceClass::Laptop);
        assert_eq!(DeviceCapabilities::classify_device(1920, 1080, None), DeviceClass::Desktop);
        assert_eq!(DeviceCapabilities::classify_device(2560, 1440, None), DeviceClass::Workstation);
        // Wide but short screens are not workstations.
        assert_eq!(DeviceCapabilities::classify_device(2560, 1080, None), DeviceClass::Desktop);
    }

    #[test]
    fn test_user_agent_hints() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let ipad = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)";
        let android_tab = "Mozilla/5.0 (Linux; Android 14; SM-X710)";
        assert_eq!(DeviceCapabilities::classify_device(1920, 1080, Some(iphone)), DeviceClass::Mobile);
        assert_eq!(DeviceCapabilities::classify_device(1366, 1024, Some(ipad)), DeviceClass::Tablet);
        assert_eq!(
            DeviceCapabilities::classify_device(1600, 2560, Some(android_tab)),
            DeviceClass::Tablet
        );
    }

    #[test]
    fn test_network_mapping() {
        assert_eq!(DeviceCapabilities::classify_network(Some("4g")), NetworkClass::Fast);
        assert_eq!(DeviceCapabilities::classify_network(Some("5G")), NetworkClass::Fast);
        assert_eq!(DeviceCapabilities::classify_network(Some("3g")), NetworkClass::Medium);
        assert_eq!(DeviceCapabilities::classify_network(Some("slow-2g")), NetworkClass::Slow);
        assert_eq!(DeviceCapabilities::classify_network(None), NetworkClass::Medium);
    }

    #[test]
    fn test_processing_refinement_overrides_seed() {
        // Workstation screen seeds very-high, but 4 cores / 4 GB is medium.
        let caps = DeviceCapabilities::from_signals(&signals(Some(4.0), Some(4), 2560, 1440));
        assert_eq!(caps.device_class, DeviceClass::Workstation);
        assert_eq!(caps.processing_power, ProcessingPower::Medium);
        assert_eq!(caps.estimated_vram_gb, 16.0);

        let caps = DeviceCapabilities::from_signals(&signals(Some(32.0), Some(16), 1440, 900));
        assert_eq!(caps.processing_power, ProcessingPower::VeryHigh);
        assert_eq!(caps.recommended_model_size, ModelSize::Large);

        let caps = DeviceCapabilities::from_signals(&signals(Some(8.0), Some(8), 1440, 900));
        assert_eq!(caps.processing_power, ProcessingPower::High);
        assert_eq!(caps.recommended_model_size, ModelSize::Medium);

        let caps = DeviceCapabilities::from_signals(&signals(Some(2.0), Some(2), 390, 844));
        assert_eq!(caps.processing_power, ProcessingPower::Low);
        assert_eq!(caps.recommended_model_size, ModelSize::Small);
    }

    #[test]
    fn test_every_field_in_domain() {
        let memories = [None, Some(f64::NAN), Some(0.25), Some(4.0), Some(64.0)];
        let cores = [None, Some(0), Some(2), Some(8), Some(32)];
        let screens = [(320, 568), (900, 1200), (1440, 900), (1920, 1080), (3840, 2160)];
        let networks = [None, Some("2g"), Some("3g"), Some("4g"), Some("wifi")];

        for memory in memories {
            for core in cores {
                for (w, h) in screens {
                    for net in networks {
                        let caps = DeviceCapabilities::from_signals(&CapabilitySignals {
                            device_memory_gb: memory,
                            hardware_concurrency: core,
                            effective_network_type: net.map(String::from),
                            viewport_width: w,
                            viewport_height: h,
                            user_agent: None,
                        });
                        assert!(caps.total_memory_gb.is_finite() && caps.total_memory_gb > 0.0);
                        assert!(caps.available_memory_gb >= MIN_AVAILABLE_MEMORY_GB);
                        assert!(caps.estimated_vram_gb.is_finite() && caps.estimated_vram_gb > 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_serialized_field_names() {
        let caps = StaticProbe::default().detect();
        let json = serde_json::to_value(&caps).unwrap();
        assert!(json["totalMemoryGB"].is_number());
        assert!(json["availableMemoryGB"].is_number());
        assert!(json["estimatedVRAMGB"].is_number());
        assert_eq!(json["processingPower"], "medium");
        assert_eq!(json["deviceClass"], "laptop");
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_viewport(" 2560 X 1440 "), Some((2560, 1440)));
        assert_eq!(parse_viewport("wide"), None);
    }

    #[test]
    fn test_system_probe_never_fails() {
        let caps = SystemProbe::default().detect();
        assert!(caps.total_memory_gb > 0.0);
        assert!(caps.available_memory_gb >= MIN_AVAILABLE_MEMORY_GB);
    }
}
