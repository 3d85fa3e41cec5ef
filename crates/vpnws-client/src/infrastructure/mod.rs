//! Infrastructure adapters.
//!
//! Everything that touches the outside world lives here: the TLS WebSocket
//! channel, PKCS#12 certificate handling, the TAP device layer, shell hook
//! execution, and the ICMP keep-alive probe.  The application layer sees
//! these only through the `vpnws-core` endpoint traits and the capability
//! traits defined alongside each adapter.

pub mod certificate;
pub mod channel;
pub mod hooks;
pub mod keepalive;
pub mod tap;

pub use certificate::{CertificateBundle, CertificateError, CertificateStore, VerificationOutcome};
pub use channel::{ChannelError, SecureChannel};
pub use hooks::{HookError, HookRunner, ShellHookRunner, DEVICE_PLACEHOLDER};
pub use tap::{platform_provider, DeviceError, TapProvider, VirtualInterface};
