mod snapshot;

pub use snapshot::{ProcessHelper, ProcessTree, SystemSnapshot};
