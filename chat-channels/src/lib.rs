pub mod registry;

pub use registry::ChannelRegistry;
