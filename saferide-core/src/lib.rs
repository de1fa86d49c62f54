pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod presence;
pub mod store;
pub mod transport;
pub mod types;

pub use config::Config;
pub use context::AppContext;
pub use directory::ContactDirectory;
pub use error::{AlertError, AlertResult};
pub use presence::{LiveSender, PresenceRegistry};
pub use store::{AccountStore, AlertStore, MemoryAccounts, MemoryAlerts};
pub use transport::{PushTransport, SmsTransport};
