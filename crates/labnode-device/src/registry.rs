use std::collections::HashMap;
use std::sync::Arc;

use labnode_session::{ApiVersion, Session};

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::pid::PidController;

/// Builds a driver around a connected session.
pub type DeviceConstructor = fn(Arc<Session>, ApiVersion) -> Box<dyn Device>;

/// Device-type keyed table of driver constructors.
pub struct DeviceRegistry {
    constructors: HashMap<u32, DeviceConstructor>,
}

impl DeviceRegistry {
    /// Create a registry without any drivers.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `constructor` for `device_type`, replacing any previous one.
    pub fn register(&mut self, device_type: u32, constructor: DeviceConstructor) {
        self.constructors.insert(device_type, constructor);
    }

    /// Build the driver for `device_type`.
    pub fn get(
        &self,
        device_type: u32,
        session: Arc<Session>,
        api_version: ApiVersion,
    ) -> Result<Box<dyn Device>> {
        let constructor = self
            .constructors
            .get(&device_type)
            .ok_or(DeviceError::UnsupportedDevice(device_type))?;
        Ok(constructor(session, api_version))
    }

    /// Check whether a driver is registered for `device_type`.
    pub fn contains(&self, device_type: u32) -> bool {
        self.constructors.contains_key(&device_type)
    }

    /// Registered device types, sorted.
    pub fn device_types(&self) -> Vec<u32> {
        let mut types: Vec<u32> = self.constructors.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for DeviceRegistry {
    /// A registry with every driver shipped in this crate.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(PidController::DEVICE_TYPE, PidController::boxed);
        registry
    }
}

#[cfg(test)]
mod tests {
    use labnode_session::SessionConfig;
    use labnode_transport::{Endpoint, TcpEndpoint};

    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            Endpoint::Tcp(TcpEndpoint::new("stub.invalid", 4223)),
            SessionConfig::default(),
        ))
    }

    fn other_pid(session: Arc<Session>, api_version: ApiVersion) -> Box<dyn Device> {
        Box::new(PidController::new(session, api_version))
    }

    #[test]
    fn default_registry_builds_pid_controller() {
        let registry = DeviceRegistry::default();
        assert_eq!(registry.device_types(), vec![0]);

        let device = registry
            .get(0, session(), ApiVersion::new(0, 11, 0))
            .unwrap();
        assert_eq!(device.device_type(), PidController::DEVICE_TYPE);
        assert_eq!(device.api_version(), ApiVersion::new(0, 11, 0));
        assert!(device.as_any().downcast_ref::<PidController>().is_some());
    }

    #[test]
    fn unknown_device_type_is_unsupported() {
        let registry = DeviceRegistry::default();
        assert!(matches!(
            registry.get(7, session(), ApiVersion::new(0, 11, 0)),
            Err(DeviceError::UnsupportedDevice(7))
        ));
        assert!(DeviceRegistry::new().get(0, session(), ApiVersion::new(0, 11, 0)).is_err());
    }

    #[test]
    fn register_overwrites() {
        let mut registry = DeviceRegistry::default();
        registry.register(0, other_pid);
        registry.register(0, other_pid);
        registry.register(3, other_pid);
        assert_eq!(registry.device_types(), vec![0, 3]);
        assert!(registry.contains(3));
        assert!(registry.get(3, session(), ApiVersion::new(0, 10, 0)).is_ok());
    }
}
