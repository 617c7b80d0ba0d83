pub mod runtime;

pub use runtime::TaskAgent;
