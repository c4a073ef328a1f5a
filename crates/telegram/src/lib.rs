pub mod gate;
pub mod notifier;
pub mod runner;
pub mod transport;

pub use gate::UserGate;
pub use notifier::TransportNotifier;
pub use runner::{MessageHandler, PollRunner, ReconnectPolicy};
pub use transport::{ChatTransport, InboundMessage, NoopTransport, TelegramTransport, TransportError};
