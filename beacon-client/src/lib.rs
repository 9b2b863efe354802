pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod relay;
pub mod session;

pub use config::{ClientConfig, ResponderMedia};
pub use error::{JoinError, MediaError, RelayError, SetupError};
pub use media::{LocalMedia, MediaKind, MediaSource, NoMedia, RemoteStream, RemoteTrack, SyntheticMedia};
pub use negotiation::{EngineState, NegotiationEngine, PeerConnector, PeerEvent, PeerTransport};
pub use relay::{RelayChannel, StompRelay, Subscription, SubscriptionHandle};
pub use session::{Coordinator, CoordinatorBuilder, SessionStatus};
