use crate::LoadArgs;

/// Connection parameters for the staging database, resolved once at startup
/// and passed by reference to everything that needs them.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl SinkConfig {
    /// Builds the driver-level connection config. Credentials go through the
    /// driver's own escaping, never through a hand-assembled string.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database);
        config
    }
}

impl From<&LoadArgs> for SinkConfig {
    fn from(args: &LoadArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            user: args.user.clone(),
            password: args.password.clone(),
            database: args.database.clone(),
        }
    }
}
