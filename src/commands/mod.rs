//! CLI commands implementation

pub mod init;
pub mod process;
pub mod run;
pub mod scan;
pub mod status;

pub use init::*;
pub use process::*;
pub use run::*;
pub use scan::*;
pub use status::*;
