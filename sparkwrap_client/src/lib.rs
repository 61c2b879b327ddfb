//! Clients for the two remote gateways: the batch job gateway and the
//! distributed file gateway.

pub mod archive;
pub mod http;
pub mod livy;
pub mod webhdfs;

/// Identity attached to outbound gateway requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}
