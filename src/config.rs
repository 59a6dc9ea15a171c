//! Configuration management for the Folio server

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::document::RenderConcurrency;
use crate::render::{RasterConfig, DEFAULT_MAX_BITMAP_PIXELS, DEFAULT_MIN_ZOOM};
use crate::service::{ViewerConfig, OPEN_TIMEOUT_SECS, RENDER_TIMEOUT_SECS};

/// 1.5 GiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1536 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub viewer: ViewerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest document body accepted by the open endpoint
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerSettings {
    pub open_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub min_zoom: f32,
    pub max_bitmap_pixels: u64,
    pub render_concurrency: RenderConcurrency,
}

/// Invalid configuration value
#[derive(Debug, thiserror::Error)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            viewer: ViewerSettings {
                open_timeout_secs: OPEN_TIMEOUT_SECS,
                render_timeout_secs: RENDER_TIMEOUT_SECS,
                min_zoom: DEFAULT_MIN_ZOOM,
                max_bitmap_pixels: DEFAULT_MAX_BITMAP_PIXELS,
                render_concurrency: RenderConcurrency::Engine,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or(&lookup, "SERVER_PORT", defaults.server.port)?,
                max_upload_bytes: parse_or(
                    &lookup,
                    "MAX_UPLOAD_BYTES",
                    defaults.server.max_upload_bytes,
                )?,
            },
            viewer: ViewerSettings {
                open_timeout_secs: parse_or(
                    &lookup,
                    "OPEN_TIMEOUT_SECS",
                    defaults.viewer.open_timeout_secs,
                )?,
                render_timeout_secs: parse_or(
                    &lookup,
                    "RENDER_TIMEOUT_SECS",
                    defaults.viewer.render_timeout_secs,
                )?,
                min_zoom: parse_or(&lookup, "MIN_ZOOM", defaults.viewer.min_zoom)?,
                max_bitmap_pixels: parse_or(
                    &lookup,
                    "MAX_BITMAP_PIXELS",
                    defaults.viewer.max_bitmap_pixels,
                )?,
                render_concurrency: parse_or(
                    &lookup,
                    "RENDER_CONCURRENCY",
                    defaults.viewer.render_concurrency,
                )?,
            },
        };

        if !config.viewer.min_zoom.is_finite() || config.viewer.min_zoom <= 0.0 {
            return Err(ConfigError {
                key: "MIN_ZOOM",
                value: config.viewer.min_zoom.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        Ok(config)
    }

    /// Viewer configuration derived from these settings
    pub fn viewer_config(&self) -> ViewerConfig {
        let viewer = &self.viewer;
        ViewerConfig {
            open_timeout: Duration::from_secs(viewer.open_timeout_secs),
            render_timeout: Duration::from_secs(viewer.render_timeout_secs),
            raster: RasterConfig {
                min_zoom: viewer.min_zoom,
                max_bitmap_pixels: viewer.max_bitmap_pixels,
            },
            concurrency: viewer.render_concurrency,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}
