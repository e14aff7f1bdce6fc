use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// RS256 public key (PEM) of the identity provider used for interactive
    /// sign-in. When unset, session credentials never validate and only API
    /// tokens can authenticate.
    pub session_jwt_public_key: Option<String>,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let session_jwt_public_key = std::env::var("FEATUREGATE_SESSION_JWT_PUBLIC_KEY").ok();

    if session_jwt_public_key.is_none() {
        let env_mode = std::env::var("FEATUREGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "FEATUREGATE_SESSION_JWT_PUBLIC_KEY is not set. \
                 Interactive sign-in cannot work without the identity provider's public key."
            );
        }
        eprintln!(
            "⚠️  FEATUREGATE_SESSION_JWT_PUBLIC_KEY is not set — session credentials will be rejected; only API tokens can authenticate."
        );
    }

    Ok(Config {
        port: std::env::var("FEATUREGATE_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/featuregate".into()),
        session_jwt_public_key,
    })
}
