/*!
Spotify liked-songs to playlist transfer service.

Users log in through Spotify's authorization-code flow, we custody their
tokens in postgres, and they can copy their saved-tracks library into a
new playlist on their account.
*/
use slog::o;
use slog::Drain;
use std::env;

pub mod config;
pub mod crypto;
pub mod errors;
pub mod identity;
pub mod models;
pub mod ops;
pub mod service;
pub mod spotify;
pub mod store;

pub use errors::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

lazy_static::lazy_static! {
    // The "base" logger that everything should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = env_or("LOG_LEVEL", "INFO")
                .parse()
                .expect("invalid log_level");
        if env_or("LOG_FORMAT", "json").to_lowercase().trim() == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "likeshift"));
}

/// Build a json `tide::Response`, either from a serializable body
/// or from a status and an error message.
#[macro_export]
macro_rules! resp {
    (json => $body:expr) => {
        tide::Response::builder(200)
            .body(tide::Body::from_json(&$body)?)
            .build()
    };
    (status => $status:expr, message => $msg:expr) => {
        tide::Response::builder($status)
            .body(serde_json::json!({ "error": $msg }))
            .build()
    };
}
