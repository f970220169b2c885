//! Card holder records and their encrypted-at-rest form.

pub mod codec;
pub mod model;

pub use codec::{CodecError, FieldCodec};
pub use model::{User, UserBuilder, ValidationError};
