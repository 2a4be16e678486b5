use crate::error::{Error, Result};

/// Size of the fixed HTTP buffer, per spec: 1 MiB plus one sentinel byte.
pub const HTTP_BUFFER_SIZE: usize = 1_048_576 + 1;

/// Default listening port (spec.md §6).
pub const DEFAULT_PORT: u16 = 8228;

/// Configuration for a running proxy instance.
///
/// Mirrors the teacher's `MicroVMConfig`/`GlobalConfig` shape: a plain
/// struct with a `validate()` that checks invariants rather than
/// encoding them in the type system, since most fields have sane
/// defaults and only need bounds-checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// TCP port the listener binds to.
    pub port: u16,

    /// `listen()` backlog, per spec.md §6.
    pub backlog: i32,

    /// Capacity of each connection buffer, in bytes.
    pub buffer_size: usize,

    /// Read timeout applied to client and origin sockets.
    pub read_timeout: std::time::Duration,

    /// Default BFS depth used by `spider`/`mirror` when the caller
    /// does not override it.
    pub explorer_depth: usize,

    /// Hard cap on the number of distinct pages a single explorer
    /// traversal will visit, regardless of remaining depth. Carried
    /// over from the original `ProxyGate` spider (see DESIGN.md).
    pub explorer_max_pages: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backlog: 3,
            buffer_size: HTTP_BUFFER_SIZE,
            read_timeout: std::time::Duration::from_secs(5),
            explorer_depth: 2,
            explorer_max_pages: 200,
        }
    }
}

impl ProxyConfig {
    /// Parses the single positional port argument accepted by the
    /// binary (spec.md §6). Invalid or missing input falls back to
    /// the default port, as specified.
    pub fn from_port_arg(arg: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(arg) = arg {
            match arg.parse::<u16>() {
                Ok(0) => log::warn!("port 0 is invalid, using default {}", DEFAULT_PORT),
                Ok(port) => config.port = port,
                Err(_) => log::warn!("could not parse port {arg:?}, using default {}", DEFAULT_PORT),
            }
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be in 1..=65535".to_string()));
        }
        if self.backlog < 1 {
            return Err(Error::Config("backlog must be at least 1".to_string()));
        }
        if self.buffer_size < 4 {
            return Err(Error::Config(
                "buffer_size must be large enough to hold a header terminator".to_string(),
            ));
        }
        if self.explorer_depth == 0 {
            return Err(Error::Config("explorer_depth must be at least 1".to_string()));
        }
        if self.explorer_max_pages == 0 {
            return Err(Error::Config(
                "explorer_max_pages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
