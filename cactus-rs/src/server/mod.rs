//! The container side: the redirector that receives directives and the
//! dispatcher that runs the named test methods.

mod context;
mod dispatcher;
mod redirector;

pub use context::{RequestView, ResponseWriter, ServerContext, Session, SESSION_COOKIE_NAME};
pub use dispatcher::{Dispatcher, InvocationState, TestOutcome};
pub use redirector::{Redirector, DEFAULT_RESULT_TTL};
