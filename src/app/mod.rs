//! Application abstraction served by the dispatch server.
//!
//! # Data Flow
//! ```text
//! Features
//!     → application.rs (HttpApplication::create_context → typed context)
//!     → ApplicationWrapper (erases the context type behind ApplicationContext)
//!     → process_request (async, may fail)
//!     → dispose_context (always, with the terminating failure if any)
//! ```
//!
//! # Design Decisions
//! - Applications are written against their own context type
//! - The dispatcher only ever sees `dyn ErasedApplication`
//! - `echo.rs` is the demo application served by the binary

pub mod application;
pub mod echo;

pub use application::{ApplicationContext, ApplicationWrapper, ErasedApplication, HttpApplication};
pub use echo::EchoApplication;
