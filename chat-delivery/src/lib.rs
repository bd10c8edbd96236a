pub mod apns;
pub mod dispatcher;
pub mod fcm;
pub mod transport;

pub use apns::ApnsTransport;
pub use dispatcher::{DeliveryDispatcher, DeliveryHandle, DeliveryOutcome, DeliveryReport};
pub use fcm::FcmTransport;
pub use transport::{MockTransport, PushNote, PushTransport, TransportError};
