use crate::errors::{HistogramError, Result};
use crate::kernel::{BatchedKernel, DeviceType, KernelConfig};
use std::collections::HashMap;

/// Builds a kernel instance from its construction-time config
pub type KernelFactory = fn(&KernelConfig) -> Result<Box<dyn BatchedKernel>>;

/// Column schema of a named op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpInfo {
    pub name: String,
    /// Input columns, each flagged as frame-typed or not
    pub inputs: Vec<(String, bool)>,
    pub outputs: Vec<String>,
}

impl OpInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn frame_input(mut self, name: &str) -> Self {
        self.inputs.push((name.to_string(), true));
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.push((name.to_string(), false));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_frame_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|(input, is_frame)| input == name && *is_frame)
    }
}

/// A kernel implementation of an op for one device type.
#[derive(Clone)]
pub struct KernelInfo {
    pub op: String,
    pub device_type: DeviceType,
    pub batched: bool,
    pub num_devices: usize,
    factory: KernelFactory,
}

impl std::fmt::Debug for KernelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelInfo")
            .field("op", &self.op)
            .field("device_type", &self.device_type)
            .field("batched", &self.batched)
            .field("num_devices", &self.num_devices)
            .finish_non_exhaustive()
    }
}

impl KernelInfo {
    pub fn new(op: &str, factory: KernelFactory) -> Self {
        Self {
            op: op.to_string(),
            device_type: DeviceType::Cpu,
            batched: false,
            num_devices: 1,
            factory,
        }
    }

    pub fn device(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn batch(mut self) -> Self {
        self.batched = true;
        self
    }

    pub fn num_devices(mut self, count: usize) -> Self {
        self.num_devices = count;
        self
    }
}

/// Explicit table of ops and their kernels, filled in at startup.
#[derive(Debug, Default)]
pub struct OpRegistry {
    ops: HashMap<String, OpInfo>,
    kernels: HashMap<(String, DeviceType), KernelInfo>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every op shipped with the crate
    pub fn with_builtin_ops() -> Result<Self> {
        let mut registry = Self::new();
        crate::ops::register_builtin(&mut registry)?;
        Ok(registry)
    }

    pub fn register_op(&mut self, info: OpInfo) -> Result<()> {
        if self.ops.contains_key(&info.name) {
            return Err(HistogramError::DuplicateRegistration { name: info.name });
        }
        tracing::debug!(op = %info.name, inputs = info.inputs.len(), outputs = info.outputs.len(), "registered op");
        self.ops.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn register_kernel(&mut self, info: KernelInfo) -> Result<()> {
        if !self.ops.contains_key(&info.op) {
            return Err(HistogramError::UnknownOp { name: info.op });
        }

        let key = (info.op.clone(), info.device_type);
        if self.kernels.contains_key(&key) {
            return Err(HistogramError::DuplicateRegistration {
                name: format!("{} kernel for {:?}", info.op, info.device_type),
            });
        }
        tracing::debug!(op = %info.op, device = ?info.device_type, batched = info.batched, "registered kernel");
        self.kernels.insert(key, info);
        Ok(())
    }

    pub fn has_op(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn op(&self, name: &str) -> Result<&OpInfo> {
        self.ops.get(name).ok_or_else(|| HistogramError::UnknownOp {
            name: name.to_string(),
        })
    }

    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn kernel(&self, op: &str, device_type: DeviceType) -> Result<&KernelInfo> {
        self.op(op)?;
        self.kernels
            .get(&(op.to_string(), device_type))
            .ok_or_else(|| HistogramError::NoKernel {
                op: op.to_string(),
                device_type,
            })
    }

    /// Creates a kernel for `op` on the devices listed in `config`.
    ///
    /// The device type is taken from the first device; every device must
    /// share it and the count must match what the kernel declared.
    pub fn instantiate(&self, op: &str, config: &KernelConfig) -> Result<Box<dyn BatchedKernel>> {
        let device_type = config.devices.first().map(|d| d.device_type).unwrap_or(DeviceType::Cpu);
        let info = self.kernel(op, device_type)?;

        let matching = config.devices.iter().filter(|d| d.device_type == info.device_type).count();
        if config.devices.len() != info.num_devices || matching != info.num_devices {
            return Err(HistogramError::DeviceMismatch {
                op: op.to_string(),
                device_type: info.device_type,
                expected: info.num_devices,
                actual: matching,
            });
        }

        (info.factory)(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::kernel::DeviceHandle;
    use crate::ops::{FRAME_INPUT, HISTOGRAM_OP, HISTOGRAM_OUTPUT};

    #[test]
    fn test_builtin_histogram_op() {
        let registry = OpRegistry::with_builtin_ops().unwrap();
        assert_eq!(registry.op_names(), vec![HISTOGRAM_OP]);

        let op = registry.op("Histogram").unwrap();
        assert_eq!(op.input_names().collect::<Vec<_>>(), vec!["frame"]);
        assert!(op.is_frame_input(FRAME_INPUT));
        assert_eq!(op.outputs, vec![HISTOGRAM_OUTPUT.to_string()]);

        let kernel = registry.kernel(HISTOGRAM_OP, DeviceType::Cpu).unwrap();
        assert!(kernel.batched);
        assert_eq!(kernel.num_devices, 1);
    }

    #[test]
    fn test_instantiate_checks_devices() {
        let registry = OpRegistry::with_builtin_ops().unwrap();

        let config = KernelConfig::new(vec![DeviceHandle::cpu(0)], Settings::default());
        let kernel = registry.instantiate(HISTOGRAM_OP, &config).unwrap();
        assert_eq!(kernel.device(), DeviceHandle::cpu(0));

        let two = KernelConfig::new(vec![DeviceHandle::cpu(0), DeviceHandle::cpu(1)], Settings::default());
        let err = registry.instantiate(HISTOGRAM_OP, &two).err().unwrap();
        assert_eq!(err.error_code(), "DEVICE_MISMATCH");

        let none = KernelConfig::new(Vec::new(), Settings::default());
        assert!(registry.instantiate(HISTOGRAM_OP, &none).is_err());

        let gpu = KernelConfig::new(vec![DeviceHandle::gpu(0)], Settings::default());
        let err = registry.instantiate(HISTOGRAM_OP, &gpu).err().unwrap();
        assert_eq!(err.error_code(), "NO_KERNEL");
    }

    #[test]
    fn test_unknown_and_duplicate() {
        let mut registry = OpRegistry::with_builtin_ops().unwrap();
        let config = KernelConfig::new(vec![DeviceHandle::cpu(0)], Settings::default());

        let err = registry.instantiate("Blur", &config).err().unwrap();
        assert_eq!(err.error_code(), "UNKNOWN_OP");
        assert!(!registry.has_op("Blur"));

        let err = registry.register_op(OpInfo::new(HISTOGRAM_OP)).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_REGISTRATION");

        let err = crate::ops::register(&mut registry).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_REGISTRATION");

        let orphan = KernelInfo::new("Blur", crate::ops::HistogramKernelCpu::factory);
        assert_eq!(registry.register_kernel(orphan).unwrap_err().error_code(), "UNKNOWN_OP");
    }

    #[test]
    fn test_custom_op_with_plain_input() {
        let mut registry = OpRegistry::new();
        registry
            .register_op(OpInfo::new("Stats").frame_input("frame").input("mask").output("stats"))
            .unwrap();
        let op = registry.op("Stats").unwrap();
        assert!(op.is_frame_input("frame"));
        assert!(!op.is_frame_input("mask"));
        assert!(matches!(
            registry.kernel("Stats", DeviceType::Cpu),
            Err(HistogramError::NoKernel { .. })
        ));
    }
}
