pub mod clock;
pub mod error;
pub mod identifier;

pub use clock::*;
pub use error::*;
pub use identifier::*;
