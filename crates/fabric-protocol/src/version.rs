/// Every request/reply payload carries this as its first field (spec §6.1:
/// "Message version is the first field of every payload"). A mismatch is
/// rejected with `ProtocolMismatch`, never partially decoded.
pub type ProtocolVersion = u16;

pub const CURRENT_VERSION: ProtocolVersion = 1;
