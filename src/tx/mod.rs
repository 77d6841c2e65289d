// Transaction module - signed value transfers between public keys

mod builder;
mod model;
mod validator;

pub use builder::*;
pub use model::*;
pub use validator::*;
