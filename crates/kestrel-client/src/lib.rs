pub mod notifier;
pub mod transport;

pub use notifier::WebhookNotifier;
pub use transport::{ReqwestTransport, TransportConfig};
