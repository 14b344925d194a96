pub mod commit;
pub mod config;
pub mod error;
pub mod patterns;
pub mod result;
pub mod session;

pub use commit::*;
pub use config::DetectionConfig;
pub use error::*;
pub use patterns::*;
pub use result::*;
pub use session::*;
