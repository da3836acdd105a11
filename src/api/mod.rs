//! Backend access: request values, the transport seam, and the JSON client.

pub mod client;
pub mod request;
pub mod transport;
