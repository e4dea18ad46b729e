//! The client side: sends test requests to the redirector and runs the
//! begin and end hooks around them.

mod caller;
mod connection;
mod http;
mod response;
mod result;

pub use caller::ClientTestCaseCaller;
pub use connection::ConnectionHelper;
pub use http::HttpClient;
pub use response::{RawResponse, WebResponse};
pub use result::ResultFactory;
