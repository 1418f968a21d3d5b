// Core of the switchyard request-dispatch engine
// Route tables, interceptor chains, handler adapters, exception and view
// resolution, and the dispatcher that drives them

pub mod adapter;
pub mod attributes;
pub mod cache;
pub mod conditional;
pub mod config;
pub mod cors;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod flash;
pub mod handler;
pub mod http;
pub mod interceptor;
pub mod locale;
pub mod logging;
pub mod mapping;
pub mod multipart;
pub mod path_helper;
pub mod path_matcher;
pub mod registry;
pub mod result;
pub mod strategies;
pub mod view;

// Re-export commonly used types
pub use adapter::*;
pub use attributes::*;
pub use cache::*;
pub use conditional::*;
pub use config::*;
pub use cors::*;
pub use dispatcher::*;
pub use error::*;
pub use exception::*;
pub use flash::*;
pub use handler::*;
pub use http::*;
pub use interceptor::*;
pub use locale::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, Rotation};
pub use mapping::*;
pub use multipart::*;
pub use path_helper::*;
pub use path_matcher::*;
pub use registry::*;
pub use result::*;
pub use strategies::*;
pub use view::*;
