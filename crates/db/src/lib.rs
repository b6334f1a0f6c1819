pub mod bootstrap;
pub mod cache;
pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod sync;

pub use bootstrap::{
    open_order_service, BootstrapError, ConfiguredOrderService, ConfiguredRemoteStore,
};
pub use cache::{FileLocalCache, InMemoryLocalCache, LocalCache, LocalEnvelope, VersionedCache};
pub use connection::{connect_remote, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryRemoteStore, RemoteOrderRecord, RemoteOrderStore, RepositoryError,
    SqlRemoteOrderStore,
};
pub use sync::{ChangeSource, OrderStateEvent, OrderStateService, SyncOptions};
