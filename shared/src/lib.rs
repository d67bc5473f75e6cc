pub mod identity;

mod logging;

pub use identity::{NodeId, PublicKey, RepoId};
pub use logging::{init_logger, LogFmt};
