pub mod browser;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod facade;
pub mod network;
pub mod notifier;
pub mod persistence;
pub mod retry;
pub mod session_manager;
pub mod orchestrator;

pub use config::CoreConfig;
pub use coordinator::OperationCoordinator;
pub use error::OperationResult;
pub use facade::WhatsAppCore;
pub use network::NetworkService;
pub use notifier::{LoggingNotifier, NullNotifier, Notifier};
pub use orchestrator::SendOrchestrator;
pub use persistence::{OutboundMessageStore, PauseState, PauseStateStore};
pub use session_manager::SessionManager;
