//! External tool integration: encoder process supervision, tool discovery,
//! and asset downloads.

pub mod assets;
pub mod encoder;
pub mod tools;

pub use assets::resolve_assets;
pub use encoder::{build_args, EncoderHandle, EncoderInput, EncoderParams, EncoderState};
pub use tools::resolve_tool;
