pub mod registry;

pub use registry::{Platform, PushRegistration, PushTokenRegistry};
