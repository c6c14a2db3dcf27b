/// Environment variable holding an explicit session identifier
pub const ENV_SESSION_ID: &str = "AWS_SESSION_IDENTIFIER";
/// Environment variable overriding the identity token audience
pub const ENV_IDENTITY_TOKEN_AUDIENCE: &str = "IDENTITY_TOKEN_AUDIENCE";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    #[default]
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Process-wide settings, fixed at startup and handed down explicitly
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub print_id_token: bool,
    pub log_level: LogLevel,
}

impl Config {
    pub fn new(print_id_token: bool, log_level: LogLevel) -> Self {
        Self {
            print_id_token,
            log_level,
        }
    }

    /// Raw identity tokens may be logged only when explicitly requested at debug verbosity
    pub fn should_print_id_token(&self) -> bool {
        self.print_id_token && self.log_level == LogLevel::Debug
    }
}

/// Read a non-empty environment variable
pub(crate) fn env_nonempty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}
