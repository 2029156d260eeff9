//! EC2 instance metadata probe.
//!
//! Used by the credential resolver (is there an instance profile?) and the
//! region resolver (which region is this instance in?). Every request is
//! bounded by a short timeout and every failure means "not available".
//! Results are memoised so repeated detection sees the same answer.

use crate::env::EnvSnapshot;
use std::sync::OnceLock;
use std::time::Duration;

/// Well-known metadata endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";

/// Upper bound for each metadata request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const ENV_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
const ENV_DISABLED: &str = "AWS_EC2_METADATA_DISABLED";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Access to instance metadata.
pub trait MetadataProbe: Send + Sync {
    /// Whether an instance profile is attached and reachable.
    fn has_instance_profile(&self) -> bool;

    /// Region of the instance, if known.
    fn region(&self) -> Option<String>;
}

/// Probe that never finds anything (not running on EC2, or tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataProbe for NoMetadata {
    fn has_instance_profile(&self) -> bool {
        false
    }

    fn region(&self) -> Option<String> {
        None
    }
}

/// Fixed answers, for tests and offline use.
#[derive(Debug, Default, Clone)]
pub struct StaticMetadata {
    /// Answer for [`MetadataProbe::has_instance_profile`]
    pub instance_profile: bool,
    /// Answer for [`MetadataProbe::region`]
    pub region: Option<String>,
}

impl MetadataProbe for StaticMetadata {
    fn has_instance_profile(&self) -> bool {
        self.instance_profile
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }
}

/// Outcome of the first contact with the endpoint, shared by every lookup.
#[derive(Debug, Clone)]
enum Session {
    /// The endpoint did not answer at all.
    Unreachable,
    /// The endpoint answered; `None` means no token, so IMDSv1.
    Reachable(Option<String>),
}

/// IMDSv2 client over HTTP.
pub struct ImdsProbe {
    agent: ureq::Agent,
    endpoint: String,
    disabled: bool,
    session: OnceLock<Session>,
    instance_profile: OnceLock<bool>,
    region: OnceLock<Option<String>>,
}

impl ImdsProbe {
    /// Create a probe for the default endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a probe for a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, PROBE_TIMEOUT)
    }

    fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            disabled: false,
            session: OnceLock::new(),
            instance_profile: OnceLock::new(),
            region: OnceLock::new(),
        }
    }

    /// Honour `AWS_EC2_METADATA_SERVICE_ENDPOINT` and
    /// `AWS_EC2_METADATA_DISABLED`.
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let mut probe = Self::with_endpoint(env.get(ENV_ENDPOINT).unwrap_or(DEFAULT_ENDPOINT));
        probe.disabled = env.is_truthy(ENV_DISABLED);
        probe
    }

    /// The endpoint being probed.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether probing is switched off.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn session(&self) -> &Session {
        self.session.get_or_init(|| {
            let url = format!("{}/latest/api/token", self.endpoint);
            match self
                .agent
                .put(&url)
                .header(TOKEN_TTL_HEADER, "21600")
                .send_empty()
            {
                Ok(mut response) => {
                    Session::Reachable(response.body_mut().read_to_string().ok())
                }
                // An HTTP error still proves the endpoint is there.
                Err(ureq::Error::StatusCode(code)) => {
                    log::debug!("Metadata token refused ({code}), using IMDSv1");
                    Session::Reachable(None)
                }
                Err(e) => {
                    log::debug!("Instance metadata unreachable: {e}");
                    Session::Unreachable
                }
            }
        })
    }

    fn get(&self, path: &str) -> Option<String> {
        if self.disabled {
            return None;
        }
        let Session::Reachable(token) = self.session() else {
            return None;
        };

        let url = format!("{}/latest/meta-data/{path}", self.endpoint);
        let mut request = self.agent.get(&url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token.trim());
        }

        match request.call() {
            Ok(mut response) => response
                .body_mut()
                .read_to_string()
                .ok()
                .map(|body| body.trim().to_string())
                .filter(|body| !body.is_empty()),
            Err(e) => {
                log::debug!("Instance metadata {path} unavailable: {e}");
                None
            }
        }
    }
}

impl Default for ImdsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProbe for ImdsProbe {
    fn has_instance_profile(&self) -> bool {
        *self
            .instance_profile
            .get_or_init(|| self.get("iam/security-credentials/").is_some())
    }

    fn region(&self) -> Option<String> {
        self.region
            .get_or_init(|| self.get("placement/region"))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Instant;

    /// Serve canned metadata answers on a local port.
    fn serve_metadata(token_status: u16) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                answer(stream, token_status);
            }
        });
        format!("http://{addr}")
    }

    fn answer(mut stream: TcpStream, token_status: u16) {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match stream.read(&mut byte) {
                Ok(1) => head.push(byte[0]),
                _ => return,
            }
        }
        let head = String::from_utf8_lossy(&head).into_owned();
        let has_token = head.to_ascii_lowercase().contains("x-aws-ec2-metadata-token: secret");

        let (status, body) = if head.starts_with("PUT /latest/api/token") {
            (token_status, "secret")
        } else if head.starts_with("GET /latest/meta-data/placement/region") {
            (200, if token_status == 200 && !has_token { "" } else { "eu-west-1" })
        } else {
            (404, "")
        };
        let _ = write!(
            stream,
            "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
    }

    #[test]
    fn test_endpoint_from_env() {
        let env = EnvSnapshot::from_pairs([(ENV_ENDPOINT, "http://127.0.0.1:1338/")]);
        let probe = ImdsProbe::from_env(&env);
        assert_eq!(probe.endpoint(), "http://127.0.0.1:1338");
        assert!(!probe.is_disabled());
    }

    #[test]
    fn test_disabled_probe_never_matches() {
        let env = EnvSnapshot::from_pairs([(ENV_DISABLED, "true")]);
        let probe = ImdsProbe::from_env(&env);
        assert!(probe.is_disabled());
        assert!(!probe.has_instance_profile());
        assert_eq!(probe.region(), None);
    }

    #[test]
    fn test_unreachable_endpoint_is_unavailable() {
        // Nothing listens on the discard port locally, so this fails fast.
        let probe = ImdsProbe::with_endpoint("http://127.0.0.1:9");
        assert!(!probe.has_instance_profile());
        assert_eq!(probe.region(), None);
    }

    #[test]
    fn test_silent_endpoint_costs_one_timeout() {
        // Accepted by the kernel backlog, never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let probe = ImdsProbe::with_timeout(endpoint, Duration::from_millis(500));

        let started = Instant::now();
        assert!(!probe.has_instance_profile());
        assert_eq!(probe.region(), None);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(950), "{elapsed:?}");
        drop(listener);
    }

    #[test]
    fn test_token_is_sent_with_lookups() {
        let probe = ImdsProbe::with_timeout(serve_metadata(200), Duration::from_secs(5));
        assert_eq!(probe.region().as_deref(), Some("eu-west-1"));
        assert!(!probe.has_instance_profile());
        assert!(matches!(probe.session(), Session::Reachable(Some(_))));
    }

    #[test]
    fn test_refused_token_falls_back_to_v1() {
        let probe = ImdsProbe::with_timeout(serve_metadata(403), Duration::from_secs(5));
        assert_eq!(probe.region().as_deref(), Some("eu-west-1"));
        assert!(matches!(probe.session(), Session::Reachable(None)));
    }

    #[test]
    fn test_static_metadata() {
        let probe = StaticMetadata {
            instance_profile: true,
            region: Some("ap-northeast-1".to_string()),
        };
        assert!(probe.has_instance_profile());
        assert_eq!(probe.region().as_deref(), Some("ap-northeast-1"));
        assert!(!NoMetadata.has_instance_profile());
    }
}
