use std::fmt;
use std::net::SocketAddr;

use log::Level;
use peercred_common::V1Query;

/// Install the process-wide logger. Called once from `main`.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

/// Logging handle for one query, carrying who asked and what
#[derive(Debug, Clone)]
pub struct QueryLog {
    client: SocketAddr,
    query: Option<String>,
}

impl QueryLog {
    pub fn new(client: SocketAddr) -> Self {
        Self { client, query: None }
    }

    /// Attach the parsed query to every following line
    pub fn with_query(&mut self, query: &V1Query) {
        self.query = Some(format!("{} -> {}", query.local_addr, query.remote_addr));
    }

    pub fn context(&self) -> String {
        match &self.query {
            Some(query) => format!("client={} query=[{}]", self.client, query),
            None => format!("client={}", self.client),
        }
    }

    pub fn log(&self, level: Level, msg: impl fmt::Display) {
        log::log!(level, "{} {}", self.context(), msg);
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.log(Level::Info, msg);
    }

    pub fn trace(&self, msg: impl fmt::Display) {
        self.log(Level::Trace, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_grows_with_query() {
        let mut log = QueryLog::new("127.0.0.1:443".parse().unwrap());
        assert_eq!(log.context(), "client=127.0.0.1:443");

        let query: V1Query = serde_json::from_str(
            r#"{"local_addr":{"ip":"127.0.0.1","port":8443},"remote_addr":{"ip":"127.0.0.1","port":900}}"#,
        )
        .unwrap();
        log.with_query(&query);
        assert_eq!(log.context(), "client=127.0.0.1:443 query=[127.0.0.1:8443 -> 127.0.0.1:900]");
    }
}
