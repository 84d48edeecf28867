//! HTTP side of the confession wall: discovering where the API lives and
//! talking to it.

pub mod client;
pub mod error;
pub mod replies;
pub mod resolver;

pub use client::{ClientConfig, FeedClient};
pub use error::{ClientError, Result};
pub use resolver::{Endpoint, Resolver, ResolverConfig, RetryPolicy};
