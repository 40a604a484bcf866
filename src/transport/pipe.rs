//! Named pipe pair transport.
//!
//! The reference transport synthesizes one duplex channel from two named,
//! OS-level unidirectional pipes derived from a shared base name: bytes
//! toward the server flow through `<base>.incoming`, bytes toward the
//! client through `<base>.outgoing`. The server reads `.incoming` and
//! writes `.outgoing`; the client mirrors it.
//!
//! - Unix: each pipe is a Unix domain socket
//! - Windows: each pipe is a Named Pipe
//!
//! # Example
//!
//! ```ignore
//! use duplexwire::transport::pipe::{PipeServerConnector, PipeClientConnector};
//!
//! let server = PipeServerConnector::bind("/tmp/dialog-host")?;
//! let client = PipeClientConnector::new("/tmp/dialog-host");
//! ```

use super::{Connector, DuplexPair};
use crate::error::Result;
use crate::handler::BoxFuture;

/// Suffix of the pipe carrying client-to-server bytes.
pub const INCOMING_SUFFIX: &str = ".incoming";

/// Suffix of the pipe carrying server-to-client bytes.
pub const OUTGOING_SUFFIX: &str = ".outgoing";

/// Generate a unique base name for a pipe pair owned by this process.
///
/// Format:
/// - Unix: `/tmp/duplexwire-{pid}-{random}`
/// - Windows: `\\.\pipe\duplexwire-{pid}-{random}`
pub fn generate_base_name() -> String {
    let pid = std::process::id();
    let rand = rand_u64();

    #[cfg(unix)]
    {
        format!("/tmp/duplexwire-{}-{:x}", pid, rand)
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\duplexwire-{}-{:x}", pid, rand)
    }
}

/// Simple random u64 from system time, process id, and a process-local
/// counter (so repeated calls never collide even on a coarse clock).
fn rand_u64() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    (nanos ^ seq.rotate_left(32)).wrapping_mul(0x517cc1b727220a95) ^ pid
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use std::path::Path;

    use tokio::net::{UnixListener, UnixStream};

    use super::*;

    /// Server-side connector: binds both pipe listeners once, accepts a
    /// fresh pair of connections per session attempt.
    pub struct PipeServerConnector {
        incoming: UnixListener,
        outgoing: UnixListener,
        base_name: String,
    }

    impl PipeServerConnector {
        /// Bind the `.incoming` and `.outgoing` listeners for `base_name`.
        ///
        /// Removes any stale socket files at those paths before binding.
        pub fn bind(base_name: &str) -> Result<Self> {
            let incoming_path = format!("{base_name}{INCOMING_SUFFIX}");
            let outgoing_path = format!("{base_name}{OUTGOING_SUFFIX}");

            for path in [&incoming_path, &outgoing_path] {
                if Path::new(path).exists() {
                    std::fs::remove_file(path)?;
                }
            }

            Ok(Self {
                incoming: UnixListener::bind(&incoming_path)?,
                outgoing: UnixListener::bind(&outgoing_path)?,
                base_name: base_name.to_string(),
            })
        }

        /// The base name both pipe paths derive from.
        pub fn base_name(&self) -> &str {
            &self.base_name
        }
    }

    impl Drop for PipeServerConnector {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(format!("{}{INCOMING_SUFFIX}", self.base_name));
            let _ = std::fs::remove_file(format!("{}{OUTGOING_SUFFIX}", self.base_name));
        }
    }

    impl Connector for PipeServerConnector {
        fn open(&self) -> BoxFuture<'_, Result<DuplexPair>> {
            Box::pin(async move {
                // Same order the client connects in: incoming first.
                let (incoming, _) = self.incoming.accept().await?;
                let (outgoing, _) = self.outgoing.accept().await?;

                let (read, _) = incoming.into_split();
                let (_, write) = outgoing.into_split();
                Ok(DuplexPair::new(read, write))
            })
        }
    }

    /// Client-side connector: initiates both pipe connections per session
    /// attempt.
    pub struct PipeClientConnector {
        base_name: String,
    }

    impl PipeClientConnector {
        /// Create a connector for the server listening on `base_name`.
        pub fn new(base_name: impl Into<String>) -> Self {
            Self {
                base_name: base_name.into(),
            }
        }

        /// The base name both pipe paths derive from.
        pub fn base_name(&self) -> &str {
            &self.base_name
        }
    }

    impl Connector for PipeClientConnector {
        fn open(&self) -> BoxFuture<'_, Result<DuplexPair>> {
            Box::pin(async move {
                // The server's incoming pipe is our outbound direction.
                let incoming =
                    UnixStream::connect(format!("{}{INCOMING_SUFFIX}", self.base_name)).await?;
                let outgoing =
                    UnixStream::connect(format!("{}{OUTGOING_SUFFIX}", self.base_name)).await?;

                let (_, write) = incoming.into_split();
                let (read, _) = outgoing.into_split();
                Ok(DuplexPair::new(read, write))
            })
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use tokio::net::windows::named_pipe::{ClientOptions, ServerOptions};

    use super::*;

    /// Server-side connector over two Named Pipes.
    pub struct PipeServerConnector {
        base_name: String,
    }

    impl PipeServerConnector {
        /// Prepare a server connector for `base_name`.
        ///
        /// Named Pipe instances are created per accept, so binding only
        /// records the name.
        pub fn bind(base_name: &str) -> Result<Self> {
            Ok(Self {
                base_name: base_name.to_string(),
            })
        }

        /// The base name both pipe paths derive from.
        pub fn base_name(&self) -> &str {
            &self.base_name
        }
    }

    impl Connector for PipeServerConnector {
        fn open(&self) -> BoxFuture<'_, Result<DuplexPair>> {
            Box::pin(async move {
                let incoming =
                    ServerOptions::new().create(format!("{}{INCOMING_SUFFIX}", self.base_name))?;
                incoming.connect().await?;

                let outgoing =
                    ServerOptions::new().create(format!("{}{OUTGOING_SUFFIX}", self.base_name))?;
                outgoing.connect().await?;

                let (read, _) = tokio::io::split(incoming);
                let (_, write) = tokio::io::split(outgoing);
                Ok(DuplexPair::new(read, write))
            })
        }
    }

    /// Client-side connector over two Named Pipes.
    pub struct PipeClientConnector {
        base_name: String,
    }

    impl PipeClientConnector {
        /// Create a connector for the server listening on `base_name`.
        pub fn new(base_name: impl Into<String>) -> Self {
            Self {
                base_name: base_name.into(),
            }
        }

        /// The base name both pipe paths derive from.
        pub fn base_name(&self) -> &str {
            &self.base_name
        }
    }

    impl Connector for PipeClientConnector {
        fn open(&self) -> BoxFuture<'_, Result<DuplexPair>> {
            Box::pin(async move {
                let incoming =
                    ClientOptions::new().open(format!("{}{INCOMING_SUFFIX}", self.base_name))?;
                let outgoing =
                    ClientOptions::new().open(format!("{}{OUTGOING_SUFFIX}", self.base_name))?;

                let (_, write) = tokio::io::split(incoming);
                let (read, _) = tokio::io::split(outgoing);
                Ok(DuplexPair::new(read, write))
            })
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{PipeClientConnector, PipeServerConnector};

#[cfg(windows)]
pub use windows_impl::{PipeClientConnector, PipeServerConnector};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_base_name_format() {
        let base = generate_base_name();

        #[cfg(unix)]
        assert!(base.starts_with("/tmp/duplexwire-"));

        #[cfg(windows)]
        assert!(base.starts_with(r"\\.\pipe\duplexwire-"));
    }

    #[test]
    fn test_generate_base_name_uniqueness() {
        let names: Vec<String> = (0..10).map(|_| generate_base_name()).collect();
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_client_pipe_pair_roundtrip() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let base = generate_base_name();
        let server = PipeServerConnector::bind(&base).unwrap();
        let client = PipeClientConnector::new(&base);

        let (server_pair, client_pair) = tokio::join!(server.open(), client.open());
        let mut server_pair = server_pair.unwrap();
        let mut client_pair = client_pair.unwrap();

        client_pair.write.write_all(b"to-server").await.unwrap();
        client_pair.write.flush().await.unwrap();
        let mut buf = [0u8; 9];
        server_pair.read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-server");

        server_pair.write.write_all(b"to-client").await.unwrap();
        server_pair.write.flush().await.unwrap();
        client_pair.read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-client");
    }

    #[cfg(unix)]
    #[test]
    fn test_bind_removes_stale_sockets_on_drop() {
        let base = generate_base_name();
        let incoming = format!("{base}{INCOMING_SUFFIX}");

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let server = PipeServerConnector::bind(&base).unwrap();
            assert!(std::path::Path::new(&incoming).exists());
            drop(server);
        });
        assert!(!std::path::Path::new(&incoming).exists());
    }
}
