//! Transport handle management.
//!
//! Handles are obtained from a [`HandleFactory`], configured, used for one
//! request and then handed back to the same factory:
//! - [`options`]: TLS context customization applied to every handle
//! - [`handle`]: the request handle and its transfer info
//! - [`multi`]: container driving several transfers concurrently
//! - [`factory`]: the factory capability and the process-wide default
//! - [`default`]: allocate per request, destroy on return
//! - [`pooled`]: bounded reuse pool (LIFO reuse, FIFO eviction)
//! - [`lease`]: guards returning handles on drop

pub mod connect;
pub mod default;
pub mod factory;
pub mod handle;
pub mod lease;
pub mod multi;
pub mod options;
pub mod pooled;

pub use self::default::DefaultHandleFactory;
pub use self::factory::{
    apply_options, default_handle_factory, default_handle_factory_with, HandleFactory,
    SharedHandleFactory,
};
pub use self::handle::{HandleId, RequestHandle, TransferInfo};
pub use self::lease::{lease_handle, lease_multi_handle, Lease};
pub use self::multi::{CompletedTransfer, MultiHandle};
pub use self::options::{TlsContextCallback, TlsContextData, TransportOptions, TransportOptionsBuilder};
pub use self::pooled::PooledHandleFactory;
