pub mod codec;
pub mod keys;
pub mod messages;

pub use keys::KeyElement;
pub use messages::{WireCommand, WireEvent};
