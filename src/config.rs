pub use self::parser::{
    AuthConfig, Config, LoggingConfig, NotificationConfig, PersistenceConfig,
    DEFAULT_DEBOUNCE_INTERVAL, DEFAULT_PERSISTENCE_FILE,
};
pub use self::validator::{ConfigError, parse_admin_channels, parse_duration};

mod parser;
mod validator;
