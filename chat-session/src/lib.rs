pub mod reconcile;
pub mod session;

pub use reconcile::{advance_cursor, merge};
pub use session::{open_session, ChannelSession};
