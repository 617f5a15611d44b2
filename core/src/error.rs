use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NetlabError {
    #[error("failed to open trace file {path}: {source}")]
    TraceOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("trace write failed: {0}")]
    TraceWrite(#[from] std::io::Error),
    #[error("no route from node {node} to {dst}")]
    NoRoute {
        node: u32,
        dst: std::net::Ipv4Addr,
    },
    #[error("address pool {base}/{mask} exhausted")]
    AddressExhausted {
        base: std::net::Ipv4Addr,
        mask: std::net::Ipv4Addr,
    },
    #[error("link {0} does not exist")]
    UnknownLink(usize),
}
