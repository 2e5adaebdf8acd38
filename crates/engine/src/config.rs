use std::path::PathBuf;
use std::time::Duration;

/// Default autopilot tick.
const DEFAULT_AUTOPILOT_INTERVAL_MS: u64 = 100;
/// Default wall-clock budget of one rule execution.
const DEFAULT_RULE_TIMEOUT_MS: u64 = 30_000;
/// Default Lua instruction budget of one rule execution.
const DEFAULT_MAX_INSTRUCTIONS: u64 = 200_000_000;
/// Default lifetime of service tokens handed to rule bodies.
const DEFAULT_SERVICE_TOKEN_EXPIRY_MINS: i64 = 15;
/// Default wait for a document lock before giving up.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Engine configuration.
///
/// `Default` yields a development configuration rooted at `./data`; tests
/// override `data_dir` with a temporary directory.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the on-disk layout.
    pub data_dir: PathBuf,
    /// Autopilot poll interval.
    pub autopilot_interval: Duration,
    /// Wall-clock limit per rule execution.
    pub rule_timeout: Duration,
    /// Lua instruction limit per rule execution.
    pub max_instructions: u64,
    /// HMAC secret for service tokens.
    pub jwt_secret: String,
    /// Service token lifetime in minutes.
    pub service_token_expiry_mins: i64,
    /// How long a board write waits for the document lock.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            autopilot_interval: Duration::from_millis(DEFAULT_AUTOPILOT_INTERVAL_MS),
            rule_timeout: Duration::from_millis(DEFAULT_RULE_TIMEOUT_MS),
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            jwt_secret: "dev-secret-change-me".into(),
            service_token_expiry_mins: DEFAULT_SERVICE_TOKEN_EXPIRY_MINS,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    /// Development configuration over `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default   |
    /// |-----------------------------|-----------|
    /// | `DATA_DIR`                  | `./data`  |
    /// | `AUTOPILOT_INTERVAL_MS`     | `100`     |
    /// | `RULE_TIMEOUT_MS`           | `30000`   |
    /// | `RULE_MAX_INSTRUCTIONS`     | `200000000` |
    /// | `JWT_SECRET`                | **required** |
    /// | `SERVICE_TOKEN_EXPIRY_MINS` | `15`      |
    /// | `LOCK_TIMEOUT_MS`           | `30000`   |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is missing or a numeric variable does not parse.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());

        let jwt_secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!jwt_secret.is_empty(), "JWT_SECRET must not be empty");

        Self {
            data_dir: PathBuf::from(data_dir),
            autopilot_interval: Duration::from_millis(env_or(
                "AUTOPILOT_INTERVAL_MS",
                DEFAULT_AUTOPILOT_INTERVAL_MS,
            )),
            rule_timeout: Duration::from_millis(env_or("RULE_TIMEOUT_MS", DEFAULT_RULE_TIMEOUT_MS)),
            max_instructions: env_or("RULE_MAX_INSTRUCTIONS", DEFAULT_MAX_INSTRUCTIONS),
            jwt_secret,
            service_token_expiry_mins: env_or(
                "SERVICE_TOKEN_EXPIRY_MINS",
                DEFAULT_SERVICE_TOKEN_EXPIRY_MINS,
            ),
            lock_timeout: Duration::from_millis(env_or("LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)),
        }
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + ToString,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid number"))
}
