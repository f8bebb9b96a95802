pub mod notification;
pub mod reply;
pub mod request;
pub mod types;
pub mod version;

pub use notification::Notification;
pub use reply::Reply;
pub use request::Request;
pub use version::{ProtocolVersion, CURRENT_VERSION};

/// Encode a message for the wire. Framing (length-prefix, auth) is the
/// transport's concern (spec §1 out-of-scope); this only fixes the
/// in-payload encoding both ends agree on.
pub fn encode<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(msg)
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
