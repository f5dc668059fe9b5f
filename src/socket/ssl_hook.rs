//! Named by contract only (spec.md §4 component table: "SSL wrapper
//! integration"). ClickNF's `sslclient.cc` wraps a socket's `send`/`recv` in
//! a TLS handshake; that wrapping is out of this crate's scope, but the seam
//! it would plug into is worth reserving so an embedder isn't forced to
//! reach past the socket API to add it later.

use crate::error::Result;

/// A hook a caller can install to transform bytes crossing a socket's
/// `send`/`recv` boundary (e.g. a TLS record layer). No implementation
/// ships here.
pub trait SslHook {
    fn wrap_outbound(&mut self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn unwrap_inbound(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
