pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod memory;
pub mod policy;
pub mod profile;
pub mod repository;
pub mod transport;
pub mod types;

pub use client::{LedgerClient, Session};
pub use codec::{DecodeFailure, Decoded, EventPayload};
pub use config::LedgerConfig;
pub use error::{Result, SdkError};
pub use index::ParticipationIndex;
pub use memory::MemoryLedger;
pub use policy::{may_record, permitted_events};
pub use profile::{InMemoryProfileStore, ProfileStore, UserProfile};
pub use repository::{BatchCreation, BatchHistory, BatchRepository, DecodedEvent};
pub use transport::{HttpTransport, LedgerTransport};
pub use types::{Batch, EventType, LedgerLog, Role, SupplyChainEvent, TxReceipt};

/// SDK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect to the ledger described by `config` over HTTP.
pub async fn connect_http(config: LedgerConfig) -> Result<BatchRepository<HttpTransport>> {
    config.validate()?;
    let transport = HttpTransport::new(config.rpc_url.clone());
    let mut repository = BatchRepository::new(LedgerClient::new(transport, config));
    repository.connect().await?;
    Ok(repository)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::LedgerClient;
    pub use crate::codec::{self, Decoded, EventPayload};
    pub use crate::config::LedgerConfig;
    pub use crate::error::{Result, SdkError};
    pub use crate::policy;
    pub use crate::repository::BatchRepository;
    pub use crate::transport::{HttpTransport, LedgerTransport};
    pub use crate::types::*;
}
