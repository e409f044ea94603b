//! Endpoint string parsing: `scheme@address`, with a bare `address` taken
//! to mean `tcp@address`.

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        UnknownScheme(scheme: String) {
            display("unknown endpoint scheme {:?}, expected tcp, unix, or http", scheme)
        }
        Empty {
            display("empty endpoint")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Unix,
    Http,
}

impl Scheme {
    fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "tcp" => Ok(Scheme::Tcp),
            "unix" => Ok(Scheme::Unix),
            "http" => Ok(Scheme::Http),
            other => Err(Error::UnknownScheme(other.to_string())),
        }
    }
}

/// Splits an endpoint string into its scheme and address. `"tcp@host:port"`,
/// `"unix@/tmp/sock"`, and `"http@host:port"` are recognized; an endpoint
/// with no `@` is treated as `tcp@<endpoint>`.
pub fn parse(endpoint: &str) -> Result<(Scheme, &str), Error> {
    if endpoint.is_empty() {
        return Err(Error::Empty);
    }
    match endpoint.split_once('@') {
        Some((scheme, addr)) => Ok((Scheme::parse(scheme)?, addr)),
        None => Ok((Scheme::Tcp, endpoint)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bare_address_is_tcp() {
        let (scheme, addr) = parse("127.0.0.1:9000").unwrap();
        assert_eq!(scheme, Scheme::Tcp);
        assert_eq!(addr, "127.0.0.1:9000");
    }

    #[test]
    fn scheme_prefixes_are_recognized() {
        assert_eq!(parse("unix@/tmp/rpc.sock").unwrap(), (Scheme::Unix, "/tmp/rpc.sock"));
        assert_eq!(parse("http@host:80").unwrap(), (Scheme::Http, "host:80"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        match parse("ftp@host:21") {
            Err(Error::UnknownScheme(s)) => assert_eq!(s, "ftp"),
            other => panic!("expected UnknownScheme, got {:?}", other),
        }
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(matches!(parse(""), Err(Error::Empty)));
    }
}
