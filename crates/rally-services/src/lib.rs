//! rally-services — the peer coordination core: registry, sessions,
//! broadcast fan-out, and the gateway task that ties them together.

pub mod broadcast;
pub mod gateway;
pub mod peer;
pub mod session;

pub use broadcast::{BroadcastStats, Broadcaster, DeliveryReport};
pub use gateway::{Gateway, GatewayCommand, GatewayError, GatewayHandle, GatewayStatus, SessionInfo};
pub use peer::{Peer, PeerRegistry, Registration};
pub use session::{Frame, Outbound, Session, SessionId, SessionTable};
