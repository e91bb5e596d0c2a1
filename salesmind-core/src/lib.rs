pub mod activity;
pub mod config;
pub mod flows;
pub mod records;
pub mod script;
pub mod stats;
pub mod transcript;
pub mod types;

pub use activity::*;
pub use config::*;
pub use records::*;
pub use script::*;
pub use stats::*;
pub use transcript::*;
pub use types::*;
