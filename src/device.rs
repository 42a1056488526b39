//! Device placement scopes
//!
//! Placement is tracked on a per-thread stack. Entering a [`DeviceScope`]
//! pushes a [`DeviceSpec`], dropping the guard pops it again, so nested
//! scopes unwind in order even on early return.
use candle_core::Device;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

thread_local! {
    static PLACEMENT: RefCell<Vec<DeviceSpec>> = const { RefCell::new(Vec::new()) };
}

/// Kind of device a placement refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

/// A named device, e.g. `/cpu:0` or `/gpu:1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    pub ordinal: usize,
}

impl DeviceSpec {
    /// The host CPU
    pub const fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            ordinal: 0,
        }
    }

    /// A CUDA device
    pub const fn cuda(ordinal: usize) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            ordinal,
        }
    }

    /// A Metal device
    pub const fn metal(ordinal: usize) -> Self {
        Self {
            kind: DeviceKind::Metal,
            ordinal,
        }
    }

    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceKind::Cpu
    }

    /// Instantiate the matching candle device
    ///
    /// Fails when candle was built without support for the device kind or
    /// the ordinal does not exist.
    pub fn to_candle(&self) -> crate::Result<Device> {
        let device = match self.kind {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::new_cuda(self.ordinal)?,
            DeviceKind::Metal => Device::new_metal(self.ordinal)?,
        };
        Ok(device)
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "gpu",
            DeviceKind::Metal => "metal",
        };
        write!(f, "/{}:{}", kind, self.ordinal)
    }
}

impl FromStr for DeviceSpec {
    type Err = crate::DataError;

    /// Accepts `/cpu:0`, `/gpu:1`, `/device:GPU:0`, `cuda:0`, `metal` and similar.
    fn from_str(s: &str) -> crate::Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let body = lowered.trim_start_matches('/');
        let body = body.strip_prefix("device:").unwrap_or(body);

        let (kind, ordinal) = match body.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal.parse::<usize>().map_err(|_| {
                    crate::DataError::InvalidArgument(format!("Invalid device ordinal in {:?}", s))
                })?;
                (kind, ordinal)
            }
            None => (body, 0),
        };

        let kind = match kind {
            "cpu" => DeviceKind::Cpu,
            "gpu" | "cuda" => DeviceKind::Cuda,
            "metal" => DeviceKind::Metal,
            _ => {
                return Err(crate::DataError::InvalidArgument(format!(
                    "Unknown device: {:?}",
                    s
                )))
            }
        };

        Ok(Self { kind, ordinal })
    }
}

/// Innermost placement on this thread, if any scope is active
pub fn current_device() -> Option<DeviceSpec> {
    PLACEMENT.with(|stack| stack.borrow().last().copied())
}

/// Guard holding a device placement for its lifetime
///
/// Not `Send`: the placement lives on the thread that entered it.
#[must_use = "the placement ends when the scope is dropped"]
pub struct DeviceScope {
    spec: DeviceSpec,
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl DeviceScope {
    /// Push a placement
    pub fn enter(spec: DeviceSpec) -> Self {
        let depth = PLACEMENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(spec);
            stack.len()
        });
        log::trace!("Entered device scope {} (depth {})", spec, depth);
        Self {
            spec,
            depth,
            _not_send: PhantomData,
        }
    }

    pub fn spec(&self) -> DeviceSpec {
        self.spec
    }
}

impl Drop for DeviceScope {
    fn drop(&mut self) {
        PLACEMENT.with(|stack| {
            stack.borrow_mut().truncate(self.depth.saturating_sub(1));
        });
        log::trace!("Left device scope {}", self.spec);
    }
}

/// Run `f` with `spec` as the active placement
pub fn with_device<R>(spec: DeviceSpec, f: impl FnOnce() -> R) -> R {
    let _scope = DeviceScope::enter(spec);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_names() {
        assert_eq!("/cpu:0".parse::<DeviceSpec>().unwrap(), DeviceSpec::cpu());
        assert_eq!("/gpu:1".parse::<DeviceSpec>().unwrap(), DeviceSpec::cuda(1));
        assert_eq!("/device:GPU:0".parse::<DeviceSpec>().unwrap(), DeviceSpec::cuda(0));
        assert_eq!("cuda:2".parse::<DeviceSpec>().unwrap(), DeviceSpec::cuda(2));
        assert_eq!("metal".parse::<DeviceSpec>().unwrap(), DeviceSpec::metal(0));
        assert!("/tpu:0".parse::<DeviceSpec>().is_err());
        assert!("/cpu:x".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for spec in [DeviceSpec::cpu(), DeviceSpec::cuda(3), DeviceSpec::metal(1)] {
            assert_eq!(spec.to_string().parse::<DeviceSpec>().unwrap(), spec);
        }
        assert_eq!(DeviceSpec::cpu().to_string(), "/cpu:0");
    }

    #[test]
    fn test_nested_scopes() {
        assert_eq!(current_device(), None);
        {
            let _outer = DeviceScope::enter(DeviceSpec::cuda(0));
            assert_eq!(current_device(), Some(DeviceSpec::cuda(0)));
            {
                let _inner = DeviceScope::enter(DeviceSpec::cpu());
                assert_eq!(current_device(), Some(DeviceSpec::cpu()));
            }
            assert_eq!(current_device(), Some(DeviceSpec::cuda(0)));
        }
        assert_eq!(current_device(), None);
    }

    #[test]
    fn test_with_device_restores_on_return() {
        let seen = with_device(DeviceSpec::metal(0), current_device);
        assert_eq!(seen, Some(DeviceSpec::metal(0)));
        assert_eq!(current_device(), None);
    }

    #[test]
    fn test_cpu_to_candle() {
        let device = DeviceSpec::cpu().to_candle().unwrap();
        assert!(device.is_cpu());
    }
}
