#![warn(clippy::unwrap_used)]
mod macros;
pub mod auth;
pub mod client;
pub mod config;
pub mod container;
pub mod cookie;
pub mod directive;
pub mod envelope;
pub mod error;
pub mod failure;
pub mod request;
pub mod server;
pub mod simulated_url;
mod testapi;
pub mod testcase;
mod testmatch;
pub mod types;
pub mod uniqueid;
pub mod utils;

pub use client::{ClientTestCaseCaller, RawResponse, WebResponse};
pub use config::{Configuration, ContainerSettings};
pub use error::{CactusError, Result};
pub use failure::TestFailure;
pub use request::WebRequest;
pub use server::{Redirector, ServerContext};
pub use testapi::{run_suite, Suite, TestSpec, Testable};
pub use testcase::{ClassLoader, TestClass, TestClassBuilder, TestRegistry};
pub use testmatch::TestMatcher;
