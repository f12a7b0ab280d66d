mod backend;
mod backends;
mod invoker;
mod outcome;
mod registry;

pub use backend::BarcodeDecoder;
pub use backends::{paint_marker, MarkerDecoder};
pub use invoker::{DecodeInvoker, DecodeScheduling, NotFoundPolicy};
pub use outcome::DecodeOutcome;
pub use registry::DecoderRegistry;
