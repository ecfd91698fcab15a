// ============================================================================
// Request Dispatch
// ============================================================================
//
// Decouples callers from handlers: a caller sends a typed request, the
// dispatcher finds its single handler, validates, then handles it.
//
// ============================================================================

mod dispatcher;
mod request;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherBuilder, VALIDATION_FAILED_MESSAGE};
pub use request::{Request, RequestHandler};
