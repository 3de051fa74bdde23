//! Identity-domain identifiers, secrets, anonymous identities, and issued tokens.

pub mod id;
pub mod identity;
pub mod secret;
pub mod token;

pub use id::*;
pub use identity::*;
pub use secret::*;
pub use token::*;
