//! Domain model (envelope, ids, structure names, errors).

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod keys;

pub use self::envelope::Envelope;
pub use self::errors::{ErrorKind, Result, SpoolError};
pub use self::ids::MessageId;
pub use self::keys::QueueKeys;
