pub mod codec;
pub mod http;
pub mod observability;
pub mod queue;

pub use codec::TaskCodec;
pub use http::*;
pub use observability::*;
pub use queue::*;
