pub mod client;
pub mod dm;
pub mod error;
pub mod event;
pub mod geohash;
pub mod keys;
pub mod schnorr;
pub mod transport;

pub use client::{RelayConfig, RelayEndpoint, RelayNotification, RelayPool, RelayState};
pub use error::{RelayError, RelayResult};
pub use event::{ClientMessage, Filter, RelayEvent, RelayMessage, Subscription};
pub use keys::RelayKeys;
pub use transport::{RelayTransport, FRAME_EVENT_KIND};
