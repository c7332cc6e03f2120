pub mod build_cmd;
pub mod lookup_cmd;
pub mod metadata_cmd;

pub use build_cmd::{cmd_build, BuildArgs};
pub use lookup_cmd::cmd_lookup;
pub use metadata_cmd::cmd_metadata;
