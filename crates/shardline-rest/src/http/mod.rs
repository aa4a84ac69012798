//! HTTP transport abstraction
//!
//! The limiter only needs request/response primitives; `ReqwestTransport` is
//! the production implementation.

mod request;
mod transport;

pub use request::{RestRequest, RestResponse};
pub use transport::{HttpTransport, ReqwestTransport};
