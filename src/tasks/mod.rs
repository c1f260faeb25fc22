pub mod call;
pub mod multi;
pub mod sequence;
pub mod simple;

pub use call::CallTask;
pub use multi::MultiTask;
pub use sequence::SequenceTask;
pub use simple::SimpleTask;
