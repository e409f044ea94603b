//! Crate-wide error type. Individual modules keep their own focused error
//! enums (so e.g. `discovery::Error` stays meaningful on its own); this one
//! exists for call sites like [`crate::xclient::XClient`] that cross those
//! module boundaries and need a single return type.

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Client(err: crate::client::Error) {
            from()
            display("client error: {}", err)
        }
        Discovery(err: crate::discovery::Error) {
            from()
            display("discovery error: {}", err)
        }
        Codec(err: crate::codec::Error) {
            from()
            display("codec error: {}", err)
        }
        Addr(err: crate::addr::Error) {
            from()
            display("address error: {}", err)
        }
        Service(err: crate::service::Error) {
            from()
            display("service error: {}", err)
        }
        Encode(err: bincode::Error) {
            from()
            display("encode error: {}", err)
        }
        Decode(err: bincode::Error) {
            display("decode error: {}", err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
