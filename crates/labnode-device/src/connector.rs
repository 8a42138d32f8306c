//! Connecting to a device and picking its driver.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use labnode_session::{identify, DeviceIdentity, Session, SessionConfig};
use labnode_transport::Endpoint;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::pid::PidController;
use crate::registry::DeviceRegistry;

/// A connected device with the driver matching its reported type.
///
/// Dropping the handle stops the session's read loop; call
/// [`close`](Self::close) to also wait for the link to shut down.
pub struct DeviceHandle {
    identity: DeviceIdentity,
    device: Box<dyn Device>,
}

impl DeviceHandle {
    /// Identify the device behind an already connected session and build
    /// its driver.
    pub async fn attach(session: Arc<Session>, registry: &DeviceRegistry) -> Result<Self> {
        let identity = identify(&session).await?;
        let device = registry.get(identity.device_type, session, identity.api_version)?;
        debug!(driver = device.name(), "driver selected");
        Ok(Self { identity, device })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    pub fn session(&self) -> &Arc<Session> {
        self.device.session()
    }

    /// The PID controller driver, if that is what is connected.
    pub fn pid(&self) -> Option<&PidController> {
        self.device.as_any().downcast_ref::<PidController>()
    }

    /// Disconnect and wait for the link to close.
    pub async fn close(self) {
        self.device.session().disconnect().await;
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("driver", &self.device.name())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Connect to `endpoint` and build the driver from the default registry.
pub async fn open(endpoint: Endpoint, config: SessionConfig) -> Result<DeviceHandle> {
    open_with(&DeviceRegistry::default(), endpoint, config).await
}

/// Connect to `endpoint` and build the driver from `registry`.
///
/// On failure after the link came up, the session is disconnected before
/// the error is returned.
pub async fn open_with(
    registry: &DeviceRegistry,
    endpoint: Endpoint,
    config: SessionConfig,
) -> Result<DeviceHandle> {
    let session = Arc::new(Session::new(endpoint, config));
    session.connect().await?;

    match DeviceHandle::attach(Arc::clone(&session), registry).await {
        Ok(handle) => {
            info!(
                endpoint = %session.endpoint(),
                device_type = handle.identity.device_type,
                api_version = %handle.identity.api_version,
                "device ready"
            );
            Ok(handle)
        }
        Err(err) => {
            warn!(endpoint = %session.endpoint(), error = %err, "device setup failed");
            session.disconnect().await;
            Err(err)
        }
    }
}

/// Run `f` with a connected device and disconnect afterwards, whether `f`
/// succeeded or not.
///
/// ```no_run
/// # async fn demo() -> labnode_device::Result<()> {
/// use labnode_device::with_device;
///
/// let endpoint = "192.168.1.50"
///     .parse::<labnode_transport::Endpoint>()
///     .map_err(labnode_session::SessionError::from)?;
/// let kp = with_device(endpoint, Default::default(), |device| {
///     Box::pin(async move {
///         match device.pid() {
///             Some(pid) => pid.kp().await,
///             None => Ok(0.0),
///         }
///     })
/// })
/// .await?;
/// # let _ = kp;
/// # Ok(())
/// # }
/// ```
pub async fn with_device<T, E, F>(
    endpoint: Endpoint,
    config: SessionConfig,
    f: F,
) -> std::result::Result<T, E>
where
    F: for<'a> FnOnce(&'a DeviceHandle) -> BoxFuture<'a, std::result::Result<T, E>>,
    E: From<DeviceError>,
{
    let handle = open(endpoint, config).await?;
    let outcome = f(&handle).await;
    handle.close().await;
    outcome
}
