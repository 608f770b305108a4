//! Authentication strategies and the token values they produce.

pub mod assertion;
pub mod secret;
pub mod strategy;
pub mod token;

pub use assertion::*;
pub use secret::*;
pub use strategy::*;
pub use token::*;
