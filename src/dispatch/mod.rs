//! Inbound message dispatch
//!
//! Raw text passes through the middleware pipeline, is parsed as JSON,
//! classified, and function-call payloads are routed to registered
//! handlers by name.

mod dispatcher;
mod functions;
mod middleware;

pub use dispatcher::{DispatchOutcome, Dispatcher, MessageKind};
pub use functions::{FunctionHandler, FunctionRegistry};
pub use middleware::{Middleware, MiddlewarePipeline};
