//! # Compute Device Selection
//!
//! Resolves the configured `models.device` into the candle device the Whisper model is built on.
//! GPU preferences fall back to CPU when the backend is not compiled in or no device is present.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Result of `auto` resolution, probed once per process
static AUTO_DEVICE: OnceLock<Device> = OnceLock::new();

/// Value of the `models.device` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// CUDA, then Metal, then CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

impl DevicePreference {
    /// The device to build the model on. Never fails; CPU is the last resort.
    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => cuda().unwrap_or_else(|| {
                warn!("CUDA requested but unavailable, using CPU");
                Device::Cpu
            }),
            DevicePreference::Metal => metal().unwrap_or_else(|| {
                warn!("Metal requested but unavailable, using CPU");
                Device::Cpu
            }),
            DevicePreference::Auto => AUTO_DEVICE
                .get_or_init(|| {
                    let device = cuda().or_else(metal).unwrap_or(Device::Cpu);
                    info!("Auto-selected {} for speech inference", device_label(&device));
                    device
                })
                .clone(),
        }
    }
}

fn cuda() -> Option<Device> {
    Device::new_cuda(0)
        .map_err(|e| debug!("CUDA not available: {}", e))
        .ok()
}

fn metal() -> Option<Device> {
    Device::new_metal(0)
        .map_err(|e| debug!("Metal not available: {}", e))
        .ok()
}

/// Short device label for logs.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA GPU",
        Device::Metal(_) => "Metal GPU",
    }
}
