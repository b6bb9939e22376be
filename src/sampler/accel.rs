use color_eyre::Result;
use serde::Serialize;

use super::snapshot::AcceleratorReading;

/// Identity of one accelerator device, as listed in session metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceIdent {
    pub id: u32,
    pub name: String,
}

/// Capability seam over the accelerator API. Probing happens once when the
/// probe is constructed, not via process-wide state, so tests can inject a
/// present/absent accelerator.
pub trait AcceleratorProbe {
    /// Whether the underlying accelerator API initialized.
    fn available(&self) -> bool;

    /// Device id/name pairs for metadata. Empty when unavailable.
    fn devices(&self) -> Vec<DeviceIdent>;

    /// One reading per device in index order. Any per-device error other
    /// than an unreadable temperature fails the whole poll; the sampler
    /// collapses a failed poll to "no accelerator data".
    fn poll(&self) -> Result<Vec<AcceleratorReading>>;
}

/// Probe used when no accelerator API is present or initialization failed.
pub struct DisabledProbe;

impl AcceleratorProbe for DisabledProbe {
    fn available(&self) -> bool {
        false
    }

    fn devices(&self) -> Vec<DeviceIdent> {
        Vec::new()
    }

    fn poll(&self) -> Result<Vec<AcceleratorReading>> {
        Ok(Vec::new())
    }
}

/// Probe returning canned readings, for tests and offline development.
pub struct FixedProbe {
    readings: Vec<AcceleratorReading>,
}

impl FixedProbe {
    pub fn new(readings: Vec<AcceleratorReading>) -> Self {
        Self { readings }
    }
}

impl AcceleratorProbe for FixedProbe {
    fn available(&self) -> bool {
        !self.readings.is_empty()
    }

    fn devices(&self) -> Vec<DeviceIdent> {
        self.readings
            .iter()
            .map(|r| DeviceIdent {
                id: r.id,
                name: r.name.clone(),
            })
            .collect()
    }

    fn poll(&self) -> Result<Vec<AcceleratorReading>> {
        Ok(self.readings.clone())
    }
}

/// Probes NVML once; unavailability is logged here and never again.
pub fn default_probe() -> Box<dyn AcceleratorProbe> {
    #[cfg(feature = "accel-nvml")]
    match nvml::NvmlProbe::init() {
        Ok(probe) => return Box::new(probe),
        Err(err) => {
            tracing::warn!("NVML unavailable, accelerator monitoring disabled: {err}");
        }
    }

    #[cfg(not(feature = "accel-nvml"))]
    tracing::warn!("built without accelerator support (accel-nvml feature disabled)");

    Box::new(DisabledProbe)
}

#[cfg(feature = "accel-nvml")]
mod nvml {
    use nvml_wrapper::Nvml;
    use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
    use nvml_wrapper::error::NvmlError;
    use tracing::warn;

    use super::{AcceleratorProbe, DeviceIdent};
    use crate::sampler::snapshot::AcceleratorReading;
    use crate::units::bytes_to_mib;

    pub struct NvmlProbe {
        nvml: Nvml,
    }

    impl NvmlProbe {
        pub fn init() -> Result<Self, NvmlError> {
            Ok(Self { nvml: Nvml::init()? })
        }

        fn read_all(&self) -> Result<Vec<AcceleratorReading>, NvmlError> {
            let count = self.nvml.device_count()?;
            let mut readings = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = self.nvml.device_by_index(i)?;
                let name = device.name()?;
                let utilization = device.utilization_rates()?;
                let memory = device.memory_info()?;
                let memory_percent = if memory.total > 0 {
                    memory.used as f64 / memory.total as f64 * 100.0
                } else {
                    0.0
                };
                // Temperature is the one per-device read allowed to fail.
                let temperature_c = device
                    .temperature(TemperatureSensor::Gpu)
                    .map(f64::from)
                    .unwrap_or(0.0);

                readings.push(AcceleratorReading {
                    id: i,
                    name,
                    load_percent: f64::from(utilization.gpu),
                    memory_used_mb: bytes_to_mib(memory.used),
                    memory_total_mb: bytes_to_mib(memory.total),
                    memory_percent,
                    temperature_c,
                });
            }
            Ok(readings)
        }

        fn device_idents(&self) -> Result<Vec<DeviceIdent>, NvmlError> {
            let count = self.nvml.device_count()?;
            let mut idents = Vec::with_capacity(count as usize);
            for i in 0..count {
                let name = self.nvml.device_by_index(i)?.name()?;
                idents.push(DeviceIdent { id: i, name });
            }
            Ok(idents)
        }
    }

    impl AcceleratorProbe for NvmlProbe {
        fn available(&self) -> bool {
            true
        }

        fn devices(&self) -> Vec<DeviceIdent> {
            self.device_idents().unwrap_or_else(|err| {
                warn!("failed to enumerate accelerator devices: {err}");
                Vec::new()
            })
        }

        fn poll(&self) -> color_eyre::Result<Vec<AcceleratorReading>> {
            Ok(self.read_all()?)
        }
    }
}
